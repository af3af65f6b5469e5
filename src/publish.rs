use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::cms::{CmsClient, NewPost, PostStatus};
use crate::convert;
use crate::docs::{self, DocsClient};
use crate::error::PublishError;
use crate::models::{DraftStatus, PublishDraft, SiteConnection};
use crate::store;

/// Which stage of a publish is underway, for phase-specific progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    UploadingImage,
    CreatingPost,
}

pub trait PublishProgress: Send + Sync {
    fn phase(&self, phase: PublishPhase);
}

/// For callers that do not render progress.
impl PublishProgress for () {
    fn phase(&self, _phase: PublishPhase) {}
}

#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub post_id: u64,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Key used for best-effort matching of a pasted site URL against saved
/// connections: scheme, `www.` and trailing slashes dropped, lowercased.
pub fn normalize_site_key(url: &str) -> String {
    let mut key = url.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = key.strip_prefix(scheme) {
            key = rest.to_string();
            break;
        }
    }
    if let Some(rest) = key.strip_prefix("www.") {
        key = rest.to_string();
    }
    key.trim_end_matches('/').to_string()
}

/// Match a row's site URL against saved connections. Requires a unique
/// match; several connections normalizing to the same key resolve to no
/// match rather than a silent first pick.
pub fn match_site<'a>(sites: &'a [SiteConnection], url: &str) -> Option<&'a SiteConnection> {
    let key = normalize_site_key(url);
    if key.is_empty() {
        return None;
    }
    let mut matches = sites
        .iter()
        .filter(|site| normalize_site_key(&site.base_url) == key);
    match (matches.next(), matches.next()) {
        (Some(site), None) => Some(site),
        _ => None,
    }
}

/// Build a draft from one direct-mode import row. Title and content start
/// synthesized from the keyword; a linked document replaces them once
/// resolved (see `resolve_draft_documents`).
pub fn draft_from_row(
    row_index: u32,
    keyword: String,
    site_url: &str,
    doc_url: Option<String>,
    sites: &[SiteConnection],
) -> PublishDraft {
    let site_id = match_site(sites, site_url).map(|site| site.id.clone());
    if site_id.is_none() {
        warn!(row = row_index + 2, url = %site_url, "no unique saved site matches this row");
    }
    PublishDraft {
        row_index,
        title: keyword.clone(),
        content_markdown: keyword.clone(),
        keyword,
        site_id,
        slug: None,
        excerpt: None,
        category: None,
        image: None,
        doc_url,
        status: DraftStatus::Idle,
        error: None,
    }
}

/// Resolve linked documents for all drafts that have one, concurrently.
/// Each draft's status is the source of truth: `loading_doc` while its
/// fetch runs, back to `idle` on success, `error` on failure.
pub async fn resolve_draft_documents(
    docs_client: &DocsClient,
    access_token: &str,
    drafts: &mut [PublishDraft],
) {
    let mut tasks = tokio::task::JoinSet::new();

    for (index, draft) in drafts.iter_mut().enumerate() {
        let Some(url) = draft.doc_url.clone() else {
            continue;
        };
        draft.status = DraftStatus::LoadingDoc;
        let docs_client = docs_client.clone();
        let token = access_token.to_string();
        tasks.spawn(async move {
            let result = match docs::extract_document_id(&url) {
                Ok(doc_id) => docs_client.fetch_document_html(&token, &doc_id).await,
                Err(e) => Err(e),
            };
            (index, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let Ok((index, result)) = joined else {
            warn!("document resolution task aborted");
            continue;
        };
        match result {
            Ok(html) => {
                let imported = convert::import_document(&html);
                if let Some(title) = imported.title {
                    drafts[index].title = title;
                }
                drafts[index].content_markdown = imported.markdown;
                drafts[index].status = DraftStatus::Idle;
            }
            Err(e) => {
                warn!(keyword = %drafts[index].keyword, error = %e, "failed to load linked document");
                drafts[index].status = DraftStatus::Error;
                drafts[index].error = Some(e.to_string());
            }
        }
    }
}

/// Publish one draft: upload the featured image first if present (its
/// failure aborts the publish), then create the post. Optional fields go
/// into the request only when set.
pub async fn publish_draft(
    cms: &CmsClient,
    site: Option<&SiteConnection>,
    draft: &PublishDraft,
    post_status: PostStatus,
    progress: &dyn PublishProgress,
) -> Result<PublishedPost, PublishError> {
    let site = site.ok_or(PublishError::NoSite)?;
    if draft.title.trim().is_empty() || draft.content_markdown.trim().is_empty() {
        return Err(PublishError::EmptyDraft);
    }

    let featured_media = match &draft.image {
        Some(image) => {
            progress.phase(PublishPhase::UploadingImage);
            let media = cms
                .upload_media(site, &image.filename, &image.mime, &image.bytes)
                .await
                .map_err(PublishError::ImageUpload)?;
            Some(media.id)
        }
        None => None,
    };

    progress.phase(PublishPhase::CreatingPost);
    let post = NewPost {
        title: draft.title.clone(),
        content: convert::markdown_to_html(&draft.content_markdown),
        status: post_status,
        slug: draft.slug.clone().filter(|s| !s.trim().is_empty()),
        excerpt: draft.excerpt.clone().filter(|s| !s.trim().is_empty()),
        categories: draft.category.into_iter().collect(),
        featured_media,
    };
    let created = cms
        .create_post(site, &post)
        .await
        .map_err(PublishError::PostCreate)?;

    Ok(PublishedPost {
        post_id: created.id,
        link: created.link,
    })
}

/// Drive every publishable draft through `publish_draft`, updating each
/// draft's status and error in place. A `success` draft stays terminal
/// and is never resubmitted. A draft that enters the run already in
/// `error` (its linked document could not be loaded) is counted as
/// failed and keeps its message instead of being resubmitted.
pub async fn publish_all(
    cms: &CmsClient,
    pool: &SqlitePool,
    drafts: &mut [PublishDraft],
    post_status: PostStatus,
    progress: &dyn PublishProgress,
) -> Result<PublishSummary> {
    let mut summary = PublishSummary::default();

    for draft in drafts.iter_mut() {
        if draft.status == DraftStatus::Error {
            // Publishing would push the synthesized keyword placeholder
            // instead of the document that failed to load.
            warn!(keyword = %draft.keyword, "draft failed before publishing, leaving it");
            summary.failed += 1;
            continue;
        }
        if !draft.publishable() {
            summary.skipped += 1;
            continue;
        }
        draft.status = DraftStatus::Publishing;

        let site = match &draft.site_id {
            Some(id) => store::get_site(pool, id).await?,
            None => None,
        };
        let result = match (&draft.site_id, &site) {
            // The saved connection was removed after matching.
            (Some(id), None) => Err(PublishError::SiteNotFound(id.clone())),
            _ => publish_draft(cms, site.as_ref(), draft, post_status, progress).await,
        };

        match result {
            Ok(post) => {
                info!(keyword = %draft.keyword, link = %post.link, "published");
                draft.status = DraftStatus::Success;
                draft.error = None;
                summary.published += 1;
            }
            Err(e) => {
                warn!(keyword = %draft.keyword, error = %e, "publish failed");
                draft.status = DraftStatus::Error;
                draft.error = Some(e.to_string());
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
