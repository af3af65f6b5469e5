use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A content-management site the user can publish to.
/// `base_url` is stored normalized (see `cms::normalize_base_url`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SiteConnection {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub app_password: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for one generation call, assembled from an imported row
/// or from CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub keyword: String,
    pub host_niche: String,
    pub target_url: String,
    pub anchor_text: String,
    pub target_niche: String,
}

/// How a job obtains its article body.
#[derive(Debug, Clone)]
pub enum JobParams {
    /// Generate fresh content from the provider.
    Generate(GenerationRequest),
    /// Adopt content from an already-written linked document.
    Document { doc_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// One unit of work in the batch queue, derived from one imported row.
/// Immutable once enqueued except for `status` and `error`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// Zero-based data-row index; used only for sheet writeback.
    pub row_index: u32,
    pub keyword: String,
    pub params: JobParams,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl Job {
    pub fn new(row_index: u32, keyword: impl Into<String>, params: JobParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            row_index,
            keyword: keyword.into(),
            params,
            status: JobStatus::Pending,
            error: None,
        }
    }
}

/// Aggregate progress of the active batch, published over a watch channel.
/// Success and failure both count as "processed".
#[derive(Debug, Clone, Default)]
pub struct BatchProgress {
    pub active: bool,
    pub total: usize,
    pub processed: usize,
    pub current: Option<String>,
    pub log: Vec<String>,
}

/// A generated article in the persisted history.
/// Inserted when generation succeeds; the only later mutation is attaching
/// the exported document id/link.
#[derive(Debug, Clone, FromRow)]
pub struct GeneratedArticle {
    pub id: String,
    pub request_id: String,
    pub keyword: String,
    pub title: String,
    pub body_markdown: String,
    pub status: String,
    pub doc_id: Option<String>,
    pub doc_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedArticle {
    pub fn new(request_id: &str, keyword: &str, title: String, body_markdown: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            keyword: keyword.to_string(),
            title,
            body_markdown,
            status: "generated".to_string(),
            doc_id: None,
            doc_link: None,
            created_at: Utc::now(),
        }
    }
}

/// One row read from the spreadsheet, interpreted per workflow mode.
#[derive(Debug, Clone)]
pub enum ImportedRow {
    Generation {
        row_index: u32,
        request: GenerationRequest,
    },
    Direct {
        row_index: u32,
        keyword: String,
        site_url: String,
        doc_url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    Idle,
    LoadingDoc,
    Publishing,
    Success,
    Error,
}

/// Featured-image payload attached to a draft.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// An editable per-row record in the bulk-publish workflow.
#[derive(Debug, Clone)]
pub struct PublishDraft {
    pub row_index: u32,
    pub keyword: String,
    pub title: String,
    pub content_markdown: String,
    /// Weak reference into the site store; a removed site surfaces as
    /// "site not found" at publish time.
    pub site_id: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<u64>,
    pub image: Option<ImageAttachment>,
    pub doc_url: Option<String>,
    pub status: DraftStatus,
    pub error: Option<String>,
}

impl PublishDraft {
    /// A draft can (re-)enter publishing only from `Idle` or `Error`;
    /// `Success` is terminal.
    pub fn publishable(&self) -> bool {
        matches!(self.status, DraftStatus::Idle | DraftStatus::Error)
    }
}
