use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "galley", about = "Galley — drafts articles from spreadsheet topics and publishes them to content sites")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file
    Validate,

    /// Generate a single article draft
    Generate {
        /// Topic keyword to write about
        keyword: String,

        /// Niche of the site hosting the article
        #[arg(long, default_value = "general")]
        host_niche: String,

        /// URL the article must link to
        #[arg(long)]
        target_url: String,

        /// Anchor text for the embedded link
        #[arg(long)]
        anchor_text: String,

        /// Niche of the linked site
        #[arg(long, default_value = "general")]
        target_niche: String,

        /// Write raw markdown output to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import spreadsheet rows and process them as a batch
    Import {
        /// Spreadsheet id or full spreadsheet URL
        sheet: String,

        /// Row layout: "generation" or "direct"
        #[arg(long, default_value = "generation")]
        mode: String,
    },

    /// Publish drafts as posts on a saved site
    Publish {
        /// Spreadsheet id or URL with direct-layout rows
        #[arg(long, conflicts_with = "file")]
        sheet: Option<String>,

        /// Local markdown file to publish
        #[arg(long)]
        file: Option<PathBuf>,

        /// Saved site name to publish to (with --file)
        #[arg(long)]
        site: Option<String>,

        /// Create the post as a draft instead of publishing it
        #[arg(long)]
        draft: bool,
    },

    /// Generation API key management
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Saved site connection management
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },

    /// Store document-host credentials
    Auth,

    /// Demo mode (canned drafts, no generation calls)
    Demo {
        #[command(subcommand)]
        command: DemoCommands,
    },

    /// Show recently generated articles
    History {
        /// Maximum number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Store an API key (prompts when the key is omitted)
    Add { key: Option<String> },
    /// List stored keys, masked
    List,
    /// Remove a key by list number or by value
    Remove { key: String },
}

#[derive(Subcommand)]
pub enum SiteCommands {
    /// Save a site connection
    Add {
        /// Display name for the site
        name: String,

        /// Site address (normalized to its https origin)
        url: String,

        /// Login username for the application password
        #[arg(long)]
        username: String,

        /// Application password (prompts when omitted)
        #[arg(long)]
        app_password: Option<String>,
    },
    /// List saved sites
    List,
    /// Remove a saved site by name
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Turn demo mode on
    On,
    /// Turn demo mode off
    Off,
    /// Show whether demo mode is active
    Status,
}
