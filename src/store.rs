use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{GeneratedArticle, SiteConnection};

/// All site columns in SELECT order (must match SiteConnection field order).
const SITE_COLUMNS: &str = "id, name, base_url, username, app_password, created_at";

/// All article columns in SELECT order (must match GeneratedArticle field order).
const ARTICLE_COLUMNS: &str =
    "id, request_id, keyword, title, body_markdown, status, doc_id, doc_link, created_at";

// Settings keys
pub const DEMO_MODE: &str = "demo_mode";
pub const GOOGLE_CLIENT_ID: &str = "google_client_id";
pub const GOOGLE_ACCESS_TOKEN: &str = "google_access_token";

/// Read a setting from the settings table.
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("reading setting")?;
    Ok(row.map(|(v,)| v))
}

/// Upsert a setting in the settings table.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("upserting setting")?;
    Ok(())
}

/// Whether demo mode is switched on (canned articles, no external calls).
pub async fn demo_mode(pool: &SqlitePool) -> Result<bool> {
    Ok(get_setting(pool, DEMO_MODE).await?.as_deref() == Some("on"))
}

pub async fn set_demo_mode(pool: &SqlitePool, on: bool) -> Result<()> {
    set_setting(pool, DEMO_MODE, if on { "on" } else { "off" }).await
}

/// The stored document-host access token, or an actionable error.
pub async fn require_access_token(pool: &SqlitePool) -> Result<String> {
    match get_setting(pool, GOOGLE_ACCESS_TOKEN).await? {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ => anyhow::bail!("no document-host access token stored, run 'galley auth' first"),
    }
}

// ── Generation API keys ────────────────────────────────────────────────

/// Store a generation API key. Returns false if the key was already stored.
/// The secret itself is never logged.
pub async fn add_api_key(pool: &SqlitePool, secret: &str) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO api_keys (secret) VALUES (?)")
        .bind(secret)
        .execute(pool)
        .await
        .context("inserting API key")?;

    let inserted = result.rows_affected() > 0;
    if inserted {
        debug!("stored generation API key");
    }
    Ok(inserted)
}

/// All stored keys as (id, secret), in rotation order.
pub async fn list_api_keys(pool: &SqlitePool) -> Result<Vec<(i64, String)>> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, secret FROM api_keys ORDER BY id")
        .fetch_all(pool)
        .await
        .context("listing API keys")?;
    Ok(rows)
}

/// Key secrets only, in rotation order (insertion order).
pub async fn api_key_secrets(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT secret FROM api_keys ORDER BY id")
        .fetch_all(pool)
        .await
        .context("listing API key secrets")?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// Delete a key by id. Returns false if no such key existed.
pub async fn remove_api_key(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("deleting API key")?;
    Ok(result.rows_affected() > 0)
}

/// Delete a key by its value. Returns false if no such key existed.
pub async fn remove_api_key_secret(pool: &SqlitePool, secret: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM api_keys WHERE secret = ?")
        .bind(secret)
        .execute(pool)
        .await
        .context("deleting API key")?;
    Ok(result.rows_affected() > 0)
}

// ── Site connections ───────────────────────────────────────────────────

pub async fn insert_site(pool: &SqlitePool, site: &SiteConnection) -> Result<()> {
    sqlx::query(
        "INSERT INTO sites (id, name, base_url, username, app_password, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&site.id)
    .bind(&site.name)
    .bind(&site.base_url)
    .bind(&site.username)
    .bind(&site.app_password)
    .bind(site.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    .execute(pool)
    .await
    .context("inserting site")?;

    debug!(name = %site.name, id = %site.id, "saved site connection");
    Ok(())
}

pub async fn list_sites(pool: &SqlitePool) -> Result<Vec<SiteConnection>> {
    let query = format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY created_at");
    let sites = sqlx::query_as::<_, SiteConnection>(&query)
        .fetch_all(pool)
        .await
        .context("listing sites")?;
    Ok(sites)
}

pub async fn get_site(pool: &SqlitePool, id: &str) -> Result<Option<SiteConnection>> {
    let query = format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?");
    let site = sqlx::query_as::<_, SiteConnection>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("querying site by id")?;
    Ok(site)
}

pub async fn get_site_by_name(pool: &SqlitePool, name: &str) -> Result<Option<SiteConnection>> {
    let query = format!("SELECT {SITE_COLUMNS} FROM sites WHERE name = ?");
    let site = sqlx::query_as::<_, SiteConnection>(&query)
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("querying site by name")?;
    Ok(site)
}

/// Delete a site by name. Returns false if no such site existed.
pub async fn remove_site(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sites WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await
        .context("deleting site")?;
    Ok(result.rows_affected() > 0)
}

// ── Article history ────────────────────────────────────────────────────

pub async fn insert_article(pool: &SqlitePool, article: &GeneratedArticle) -> Result<()> {
    sqlx::query(
        "INSERT INTO articles (id, request_id, keyword, title, body_markdown, status, doc_id, doc_link, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&article.id)
    .bind(&article.request_id)
    .bind(&article.keyword)
    .bind(&article.title)
    .bind(&article.body_markdown)
    .bind(&article.status)
    .bind(&article.doc_id)
    .bind(&article.doc_link)
    .bind(article.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    .execute(pool)
    .await
    .context("inserting article")?;

    debug!(keyword = %article.keyword, id = %article.id, "saved generated article");
    Ok(())
}

/// Attach the exported document to an article and mark it exported.
pub async fn attach_document(
    pool: &SqlitePool,
    article_id: &str,
    doc_id: &str,
    doc_link: &str,
) -> Result<()> {
    sqlx::query("UPDATE articles SET doc_id = ?, doc_link = ?, status = 'exported' WHERE id = ?")
        .bind(doc_id)
        .bind(doc_link)
        .bind(article_id)
        .execute(pool)
        .await
        .context("attaching document to article")?;
    Ok(())
}

/// Most recent articles first.
pub async fn recent_articles(pool: &SqlitePool, limit: i64) -> Result<Vec<GeneratedArticle>> {
    let query = format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC, id LIMIT ?"
    );
    let articles = sqlx::query_as::<_, GeneratedArticle>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("querying recent articles")?;
    Ok(articles)
}
