use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cms: CmsConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "galley.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_min_words")]
    pub min_words: u32,
    #[serde(default = "default_max_words")]
    pub max_words: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Pause between batch jobs to stay under the provider's rate limit.
    #[serde(default = "default_cooldown")]
    pub cooldown: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_model(),
            language: default_language(),
            min_words: default_min_words(),
            max_words: default_max_words(),
            max_output_tokens: default_max_output_tokens(),
            cooldown: default_cooldown(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_language() -> String {
    "English".to_string()
}
fn default_min_words() -> u32 {
    800
}
fn default_max_words() -> u32 {
    1200
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_cooldown() -> String {
    "3s".to_string()
}
fn default_request_timeout() -> String {
    "30s".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmsConfig {
    /// Cross-origin relay prefix for tiers 3 and 4. The target URL is
    /// appended percent-encoded. Empty disables the relayed tiers.
    #[serde(default = "default_relay")]
    pub relay: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            relay: default_relay(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_relay() -> String {
    "https://api.allorigins.win/raw?url=".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_endpoint")]
    pub endpoint: String,
    /// Column the exported-document link is written back to.
    #[serde(default = "default_result_column")]
    pub result_column: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_sheets_endpoint(),
            result_column: default_result_column(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_sheets_endpoint() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_result_column() -> String {
    "F".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_docs_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_docs_endpoint(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_docs_endpoint() -> String {
    "https://www.googleapis.com".to_string()
}

impl Config {
    /// Resolve the database path (relative to data_dir if not absolute).
    pub fn db_path(&self) -> PathBuf {
        let db_path = Path::new(&self.database.path);
        if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            self.app.data_dir.join(db_path)
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    // Word band must be a usable range
    if config.generation.min_words == 0 || config.generation.min_words > config.generation.max_words {
        return Err(ConfigError::Validation(format!(
            "generation word band {}..{} is not a valid range",
            config.generation.min_words, config.generation.max_words
        ))
        .into());
    }

    // Durations must be parseable
    for (name, value) in [
        ("generation.cooldown", &config.generation.cooldown),
        ("generation.request_timeout", &config.generation.request_timeout),
        ("cms.request_timeout", &config.cms.request_timeout),
        ("sheets.request_timeout", &config.sheets.request_timeout),
        ("docs.request_timeout", &config.docs.request_timeout),
    ] {
        humantime::parse_duration(value)
            .map_err(|e| ConfigError::Validation(format!("{name} '{value}': {e}")))?;
    }

    // Endpoints must be http(s) URLs
    for (name, value) in [
        ("generation.endpoint", &config.generation.endpoint),
        ("sheets.endpoint", &config.sheets.endpoint),
        ("docs.endpoint", &config.docs.endpoint),
    ] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{name} '{value}' must start with http:// or https://"
            ))
            .into());
        }
    }

    // The relay is a URL prefix the target is appended to; empty is allowed
    // (disables the relayed tiers) but a non-empty value must be a URL.
    if !config.cms.relay.is_empty()
        && !config.cms.relay.starts_with("http://")
        && !config.cms.relay.starts_with("https://")
    {
        return Err(ConfigError::Validation(format!(
            "cms.relay '{}' must start with http:// or https://",
            config.cms.relay
        ))
        .into());
    }

    // Result column must be a plain column letter like "F" or "AA"
    if config.sheets.result_column.is_empty()
        || !config
            .sheets
            .result_column
            .chars()
            .all(|c| c.is_ascii_uppercase())
    {
        return Err(ConfigError::Validation(format!(
            "sheets.result_column '{}' must be one or more uppercase letters",
            config.sheets.result_column
        ))
        .into());
    }

    Ok(())
}

/// Parse a configured humantime duration, falling back when unparseable.
/// `validate_config` rejects bad values up front; the fallback covers
/// configs edited after startup checks.
pub fn duration_or(value: &str, fallback: std::time::Duration) -> std::time::Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}
