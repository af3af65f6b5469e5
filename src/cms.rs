use std::fmt;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CmsConfig, duration_or};
use crate::error::CmsError;
use crate::models::SiteConnection;

/// Normalize a user-pasted site URL into a canonical base URL: force
/// https, cut any admin or API-root suffix, strip trailing slashes.
/// Host case is preserved.
pub fn normalize_base_url(input: &str) -> String {
    let mut url = input.trim().to_string();
    for scheme in ["https://", "http://"] {
        // A cut at scheme length can land inside a multi-byte character
        // of an international host name.
        let has_scheme = url
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme));
        if has_scheme {
            url = url[scheme.len()..].to_string();
            break;
        }
    }
    for marker in ["/wp-admin", "/wp-json", "/wp-login"] {
        if let Some(pos) = url.find(marker) {
            url.truncate(pos);
        }
    }
    let url = url.trim_end_matches('/');
    format!("https://{url}")
}

/// One delivery approach for reaching a site's REST interface. Tried in
/// declaration order until one yields a definite answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTier {
    /// Canonical REST path under the base URL (pretty permalinks).
    Rest,
    /// `?rest_route=` routing for sites without pretty permalinks.
    QueryString,
    /// Tier 1 through the cross-origin relay.
    RelayedRest,
    /// Tier 2 through the cross-origin relay.
    RelayedQueryString,
}

impl fmt::Display for DeliveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryTier::Rest => "REST route",
            DeliveryTier::QueryString => "query-string route",
            DeliveryTier::RelayedRest => "relayed REST route",
            DeliveryTier::RelayedQueryString => "relayed query-string route",
        };
        f.write_str(name)
    }
}

/// Build the request URL for one tier. `route` is the path under
/// `/wp/v2/`, optionally with a query string ("categories?page=2").
fn tier_url(tier: DeliveryTier, base_url: &str, route: &str, relay: &str) -> String {
    match tier {
        DeliveryTier::Rest => format!("{base_url}/wp-json/wp/v2/{route}"),
        DeliveryTier::QueryString => {
            let (path, query) = match route.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (route, None),
            };
            let mut url = format!("{base_url}/?rest_route=/wp/v2/{path}");
            if let Some(query) = query {
                url.push('&');
                url.push_str(query);
            }
            url
        }
        DeliveryTier::RelayedRest => {
            let direct = tier_url(DeliveryTier::Rest, base_url, route, relay);
            format!("{relay}{}", percent_encode(&direct))
        }
        DeliveryTier::RelayedQueryString => {
            let direct = tier_url(DeliveryTier::QueryString, base_url, route, relay);
            format!("{relay}{}", percent_encode(&direct))
        }
    }
}

fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn basic_auth_header(username: &str, password: &str) -> String {
    use base64::Engine;
    // Encoding raw UTF-8 bytes keeps non-ASCII usernames/passwords working.
    let credentials =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {credentials}")
}

/// Clean a filename for the upload disposition header: ASCII letters,
/// digits, dots, dashes and underscores only.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(&['-', '.'][..]);
    if trimmed.is_empty() {
        "upload.bin".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: u64,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPost {
    pub id: u64,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Draft,
}

/// Body for post creation. Optional fields are left out of the JSON
/// entirely when absent so site defaults apply.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
}

const CATEGORIES_PER_PAGE: usize = 100;

/// Client for an unpredictably configured content-management site.
/// Every call walks the delivery tiers in order and stops at the first
/// success or unambiguous authentication failure.
pub struct CmsClient {
    http: reqwest::Client,
    relay: String,
}

impl CmsClient {
    pub fn new(config: &CmsConfig) -> Result<Self> {
        let timeout = duration_or(&config.request_timeout, std::time::Duration::from_secs(30));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building CMS HTTP client")?;
        Ok(Self {
            http,
            relay: config.relay.clone(),
        })
    }

    fn tiers(&self) -> Vec<DeliveryTier> {
        if self.relay.is_empty() {
            vec![DeliveryTier::Rest, DeliveryTier::QueryString]
        } else {
            vec![
                DeliveryTier::Rest,
                DeliveryTier::QueryString,
                DeliveryTier::RelayedRest,
                DeliveryTier::RelayedQueryString,
            ]
        }
    }

    pub async fn get_json(
        &self,
        site: &SiteConnection,
        route: &str,
    ) -> Result<serde_json::Value, CmsError> {
        self.request_json(site, Method::GET, route, None).await
    }

    pub async fn post_json(
        &self,
        site: &SiteConnection,
        route: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, CmsError> {
        self.request_json(site, Method::POST, route, Some(body)).await
    }

    async fn request_json(
        &self,
        site: &SiteConnection,
        method: Method,
        route: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, CmsError> {
        let auth = basic_auth_header(&site.username, &site.app_password);
        let mut last_failure: Option<(String, String)> = None;

        for tier in self.tiers() {
            let url = tier_url(tier, &site.base_url, route, &self.relay);
            debug!(tier = %tier, url = %url, "attempting delivery");

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, &auth);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| CmsError::InvalidResponse(e.to_string()));
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        // Credentials are tier-independent; trying further
                        // routes cannot fix a rejected login.
                        return Err(CmsError::Auth {
                            tier,
                            status: status.as_u16(),
                        });
                    }
                    // 404 here usually means this routing style is not
                    // supported (no pretty permalinks); keep falling through.
                    last_failure = Some((url, format!("HTTP {}", status.as_u16())));
                }
                Err(e) => {
                    last_failure = Some((url, e.to_string()));
                }
            }
        }

        let (url, detail) = last_failure
            .unwrap_or_else(|| (site.base_url.clone(), "no delivery tiers configured".to_string()));
        Err(CmsError::AllTiersFailed { url, detail })
    }

    /// Upload a raw media file. Same tier walk and classification as the
    /// JSON path, but the payload is a byte stream with its own
    /// content-type/disposition headers, so it cannot share `request_json`.
    pub async fn upload_media(
        &self,
        site: &SiteConnection,
        filename: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<MediaItem, CmsError> {
        let auth = basic_auth_header(&site.username, &site.app_password);
        let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
        let mut last_failure: Option<(String, String)> = None;

        for tier in self.tiers() {
            let url = tier_url(tier, &site.base_url, "media", &self.relay);
            debug!(tier = %tier, url = %url, "attempting media upload");

            let request = self
                .http
                .post(&url)
                .header(AUTHORIZATION, &auth)
                .header(CONTENT_TYPE, mime)
                .header(CONTENT_DISPOSITION, &disposition)
                .body(bytes.to_vec());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| CmsError::InvalidResponse(e.to_string()));
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(CmsError::Auth {
                            tier,
                            status: status.as_u16(),
                        });
                    }
                    last_failure = Some((url, format!("HTTP {}", status.as_u16())));
                }
                Err(e) => {
                    last_failure = Some((url, e.to_string()));
                }
            }
        }

        let (url, detail) = last_failure
            .unwrap_or_else(|| (site.base_url.clone(), "no delivery tiers configured".to_string()));
        Err(CmsError::AllTiersFailed { url, detail })
    }

    /// All categories on the site, including empty ones, across pages.
    pub async fn list_categories(&self, site: &SiteConnection) -> Result<Vec<Category>, CmsError> {
        let mut categories = Vec::new();
        let mut page = 1;
        loop {
            let route =
                format!("categories?per_page={CATEGORIES_PER_PAGE}&page={page}&hide_empty=false");
            let value = self.get_json(site, &route).await?;
            let batch: Vec<Category> = serde_json::from_value(value)
                .map_err(|e| CmsError::InvalidResponse(e.to_string()))?;
            let len = batch.len();
            categories.extend(batch);
            if len < CATEGORIES_PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(categories)
    }

    pub async fn create_post(
        &self,
        site: &SiteConnection,
        post: &NewPost,
    ) -> Result<CreatedPost, CmsError> {
        let body =
            serde_json::to_value(post).map_err(|e| CmsError::InvalidResponse(e.to_string()))?;
        let value = self.post_json(site, "posts", &body).await?;
        serde_json::from_value(value).map_err(|e| CmsError::InvalidResponse(e.to_string()))
    }
}
