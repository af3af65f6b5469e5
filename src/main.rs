use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use galley::cli::{Cli, Commands, DemoCommands, KeyCommands, SiteCommands};
use galley::cms::{self, CmsClient, PostStatus};
use galley::config::{duration_or, load_config, validate_config};
use galley::convert;
use galley::db;
use galley::docs::DocsClient;
use galley::generate::{self, GenerationClient};
use galley::models::{
    DraftStatus, GeneratedArticle, GenerationRequest, ImportedRow, Job, JobParams, PublishDraft,
    SiteConnection,
};
use galley::pipeline::PipelineRunner;
use galley::publish::{self, PublishPhase, PublishProgress};
use galley::queue::QueueEngine;
use galley::sheets::{self, SheetsClient, WorkflowMode};
use galley::store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config_path = %cli.config.display(), "config loaded");

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Commands::Validate => {
            println!("Configuration is valid.");
        }
        Commands::Generate {
            keyword,
            host_niche,
            target_url,
            anchor_text,
            target_niche,
            output,
        } => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            info!(db_path = %config.db_path().display(), "database ready");

            let request = GenerationRequest {
                keyword,
                host_niche,
                target_url,
                anchor_text,
                target_niche,
            };

            let markdown = if store::demo_mode(&pool).await? {
                info!("demo mode active, returning canned draft");
                generate::demo_article(&request)
            } else {
                let client = GenerationClient::new(config.generation.clone())?;
                let stored = store::api_key_secrets(&pool).await?;
                let keys = generate::candidate_keys(&stored, generate::env_api_key());
                client.generate(&request, &keys).await?
            };

            let title = convert::first_heading(&markdown).unwrap_or_else(|| request.keyword.clone());
            let article = GeneratedArticle::new(
                &Uuid::new_v4().to_string(),
                &request.keyword,
                title,
                markdown.clone(),
            );
            store::insert_article(&pool, &article).await?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &markdown)
                        .with_context(|| format!("writing output to {}", path.display()))?;
                    println!("Draft written to: {}", path.display());
                }
                None => println!("{markdown}"),
            }
        }
        Commands::Import { sheet, mode } => {
            let mode = mode.parse::<WorkflowMode>().map_err(anyhow::Error::msg)?;

            let pool = db::create_pool(&config).await.context("creating database")?;
            info!(db_path = %config.db_path().display(), "database ready");

            let demo = store::demo_mode(&pool).await?;
            if demo {
                println!("Demo mode is on — drafts are canned and results stay local.");
            }

            let spreadsheet_id = sheets::extract_spreadsheet_id(&sheet);
            let sheets_client = SheetsClient::new(&config.sheets)?;
            let token = store::require_access_token(&pool).await?;
            let rows = sheets_client
                .read_rows(&token, &spreadsheet_id, mode)
                .await
                .context("reading spreadsheet rows")?;
            if rows.is_empty() {
                println!("No importable rows found.");
                return Ok(());
            }

            let mut jobs = Vec::new();
            for row in rows {
                match row {
                    ImportedRow::Generation { row_index, request } => {
                        let keyword = request.keyword.clone();
                        jobs.push(Job::new(row_index, keyword, JobParams::Generate(request)));
                    }
                    ImportedRow::Direct {
                        row_index,
                        keyword,
                        doc_url: Some(doc_url),
                        ..
                    } => {
                        jobs.push(Job::new(row_index, keyword, JobParams::Document { doc_url }));
                    }
                    ImportedRow::Direct {
                        row_index, keyword, ..
                    } => {
                        warn!(row = row_index + 2, keyword = %keyword, "row has no document link, skipping");
                    }
                }
            }
            if jobs.is_empty() {
                println!("No processable rows found.");
                return Ok(());
            }

            let cooldown = if demo {
                Duration::ZERO
            } else {
                duration_or(&config.generation.cooldown, Duration::from_secs(3))
            };
            let runner = PipelineRunner::new(
                pool.clone(),
                GenerationClient::new(config.generation.clone())?,
                DocsClient::new(&config.docs)?,
                sheets_client,
                spreadsheet_id,
                demo,
            );

            let cancel = CancellationToken::new();
            let engine = QueueEngine::new(Arc::new(runner), cooldown, cancel.clone());

            // Ctrl-C stops dequeuing; the row already in flight still finishes.
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal_cancel.cancel();
                }
            });

            let mut progress_rx = engine.subscribe();
            engine.enqueue(jobs).await;

            // Mirror the batch log to stdout until the queue drains.
            let mut printed = 0;
            loop {
                let snapshot = progress_rx.borrow_and_update().clone();
                for line in &snapshot.log[printed..] {
                    println!("{line}");
                }
                printed = snapshot.log.len();
                if !snapshot.active {
                    break;
                }
                if progress_rx.changed().await.is_err() {
                    break;
                }
            }

            let progress = engine.progress();
            println!("Processed {} of {} row(s).", progress.processed, progress.total);
        }
        Commands::Publish {
            sheet,
            file,
            site,
            draft,
        } => {
            let post_status = if draft { PostStatus::Draft } else { PostStatus::Publish };
            let pool = db::create_pool(&config).await.context("creating database")?;
            let cms_client = CmsClient::new(&config.cms)?;

            if let Some(path) = file {
                let site_name = site.ok_or_else(|| anyhow::anyhow!("--site is required with --file"))?;
                let site = store::get_site_by_name(&pool, &site_name)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("no saved site named '{site_name}'"))?;

                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let (heading, body) = convert::split_leading_heading(&content);
                let title = heading.unwrap_or_else(|| {
                    path.file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "Untitled".to_string())
                });

                let single = PublishDraft {
                    row_index: 0,
                    keyword: title.clone(),
                    title,
                    content_markdown: body,
                    site_id: Some(site.id.clone()),
                    slug: None,
                    excerpt: None,
                    category: None,
                    image: None,
                    doc_url: None,
                    status: DraftStatus::Idle,
                    error: None,
                };
                let post =
                    publish::publish_draft(&cms_client, Some(&site), &single, post_status, &ConsoleProgress)
                        .await?;
                println!("Post created: {}", post.link);
            } else if let Some(sheet) = sheet {
                let token = store::require_access_token(&pool).await?;
                let spreadsheet_id = sheets::extract_spreadsheet_id(&sheet);
                let sheets_client = SheetsClient::new(&config.sheets)?;
                let rows = sheets_client
                    .read_rows(&token, &spreadsheet_id, WorkflowMode::Direct)
                    .await
                    .context("reading spreadsheet rows")?;

                let sites = store::list_sites(&pool).await?;
                let mut drafts: Vec<PublishDraft> = rows
                    .into_iter()
                    .filter_map(|row| match row {
                        ImportedRow::Direct {
                            row_index,
                            keyword,
                            site_url,
                            doc_url,
                        } => Some(publish::draft_from_row(row_index, keyword, &site_url, doc_url, &sites)),
                        ImportedRow::Generation { .. } => None,
                    })
                    .collect();
                if drafts.is_empty() {
                    println!("No publishable rows found.");
                    return Ok(());
                }

                let docs_client = DocsClient::new(&config.docs)?;
                publish::resolve_draft_documents(&docs_client, &token, &mut drafts).await;
                let summary =
                    publish::publish_all(&cms_client, &pool, &mut drafts, post_status, &ConsoleProgress)
                        .await?;

                for row_draft in &drafts {
                    match row_draft.status {
                        DraftStatus::Success => {
                            println!("row {}: published \"{}\"", row_draft.row_index + 2, row_draft.title);
                        }
                        DraftStatus::Error => {
                            println!(
                                "row {}: failed — {}",
                                row_draft.row_index + 2,
                                row_draft.error.as_deref().unwrap_or("unknown error")
                            );
                        }
                        _ => {
                            println!("row {}: skipped", row_draft.row_index + 2);
                        }
                    }
                }
                println!(
                    "Published {}, failed {}, skipped {}.",
                    summary.published, summary.failed, summary.skipped
                );
            } else {
                anyhow::bail!("pass --sheet or --file to choose what to publish");
            }
        }
        Commands::Key { command } => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            match command {
                KeyCommands::Add { key } => {
                    let secret = match key {
                        Some(value) => value,
                        None => rpassword::prompt_password_stdout("API key: ").context("reading API key")?,
                    };
                    let secret = secret.trim();
                    if secret.is_empty() {
                        anyhow::bail!("API key must not be empty");
                    }
                    if store::add_api_key(&pool, secret).await? {
                        println!("Key stored.");
                    } else {
                        println!("Key was already stored.");
                    }
                }
                KeyCommands::List => {
                    let keys = store::list_api_keys(&pool).await?;
                    if keys.is_empty() {
                        println!("No keys stored. Add one with 'galley key add'.");
                    }
                    for (id, secret) in keys {
                        println!("{id}. {}", mask_secret(&secret));
                    }
                }
                KeyCommands::Remove { key } => {
                    let removed = match key.parse::<i64>() {
                        Ok(id) => store::remove_api_key(&pool, id).await?,
                        Err(_) => store::remove_api_key_secret(&pool, &key).await?,
                    };
                    if removed {
                        println!("Key removed.");
                    } else {
                        println!("No matching key found.");
                    }
                }
            }
        }
        Commands::Site { command } => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            match command {
                SiteCommands::Add {
                    name,
                    url,
                    username,
                    app_password,
                } => {
                    let app_password = match app_password {
                        Some(value) => value,
                        None => rpassword::prompt_password_stdout("Application password: ")
                            .context("reading application password")?,
                    };
                    let app_password = app_password.trim().to_string();
                    if app_password.is_empty() {
                        anyhow::bail!("application password must not be empty");
                    }

                    let base_url = cms::normalize_base_url(&url);
                    let site = SiteConnection {
                        id: Uuid::new_v4().to_string(),
                        name: name.clone(),
                        base_url: base_url.clone(),
                        username,
                        app_password,
                        created_at: Utc::now(),
                    };
                    store::insert_site(&pool, &site).await.context("saving site")?;
                    println!("Saved site '{name}' ({base_url}).");
                }
                SiteCommands::List => {
                    let sites = store::list_sites(&pool).await?;
                    if sites.is_empty() {
                        println!("No sites saved. Add one with 'galley site add'.");
                    }
                    for site in sites {
                        println!("{} — {} (user: {})", site.name, site.base_url, site.username);
                    }
                }
                SiteCommands::Remove { name } => {
                    if store::remove_site(&pool, &name).await? {
                        println!("Removed site '{name}'.");
                    } else {
                        println!("No site named '{name}'.");
                    }
                }
            }
        }
        Commands::Auth => {
            let pool = db::create_pool(&config).await.context("creating database")?;

            print!("OAuth client id: ");
            std::io::stdout().flush()?;
            let mut client_id = String::new();
            std::io::stdin().read_line(&mut client_id)?;
            let client_id = client_id.trim();
            if client_id.is_empty() {
                anyhow::bail!("client id must not be empty");
            }

            let token =
                rpassword::prompt_password_stdout("Access token: ").context("reading access token")?;
            let token = token.trim();
            if token.is_empty() {
                anyhow::bail!("access token must not be empty");
            }

            store::set_setting(&pool, store::GOOGLE_CLIENT_ID, client_id).await?;
            store::set_setting(&pool, store::GOOGLE_ACCESS_TOKEN, token).await?;
            println!("Document-host credentials stored.");
        }
        Commands::Demo { command } => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            match command {
                DemoCommands::On => {
                    store::set_demo_mode(&pool, true).await?;
                    println!("Demo mode is on.");
                }
                DemoCommands::Off => {
                    store::set_demo_mode(&pool, false).await?;
                    println!("Demo mode is off.");
                }
                DemoCommands::Status => {
                    let on = store::demo_mode(&pool).await?;
                    println!("Demo mode is {}.", if on { "on" } else { "off" });
                }
            }
        }
        Commands::History { limit } => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            let articles = store::recent_articles(&pool, limit).await?;
            if articles.is_empty() {
                println!("No articles generated yet.");
            }
            for article in articles {
                println!(
                    "{}  {} [{}]",
                    article.created_at.format("%Y-%m-%d %H:%M"),
                    article.title,
                    article.status
                );
                if let Some(link) = article.doc_link {
                    println!("    {link}");
                }
            }
        }
    }

    Ok(())
}

struct ConsoleProgress;

impl PublishProgress for ConsoleProgress {
    fn phase(&self, phase: PublishPhase) {
        match phase {
            PublishPhase::UploadingImage => println!("  uploading featured image..."),
            PublishPhase::CreatingPost => println!("  creating post..."),
        }
    }
}

/// Keys are shown masked; the full value never reaches stdout.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}
