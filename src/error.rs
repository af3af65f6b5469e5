use thiserror::Error;

use crate::cms::DeliveryTier;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generation API keys configured — add one with 'galley key add'")]
    NoApiKeys,
    #[error("generation request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    #[error("generation provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("generation provider returned an empty completion")]
    EmptyCompletion,
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum CmsError {
    #[error(
        "authentication rejected (HTTP {status}) on the {tier}. \
         Check the username and application password for this site."
    )]
    Auth { tier: DeliveryTier, status: u16 },
    #[error(
        "could not reach the site's REST interface by any route (last tried {url}: {detail}). \
         Likely causes: a firewall or security plugin blocking the REST API, a non-HTTPS site, \
         or malformed permalink settings."
    )]
    AllTiersFailed { url: String, detail: String },
    #[error("unexpected response from the site: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("spreadsheet request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("spreadsheet API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected spreadsheet response: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum DocError {
    #[error("document request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    #[error("document API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unrecognized document link: {0}")]
    InvalidLink(String),
    #[error("unexpected document response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no target site selected for this draft")]
    NoSite,
    #[error("site '{0}' not found — it may have been removed")]
    SiteNotFound(String),
    #[error("draft needs a non-empty title and content before publishing")]
    EmptyDraft,
    #[error("featured image upload failed: {0}")]
    ImageUpload(#[source] CmsError),
    #[error("post creation failed: {0}")]
    PostCreate(#[source] CmsError),
}
