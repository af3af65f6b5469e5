use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::convert;
use crate::docs::{self, DocsClient};
use crate::generate::{self, GenerationClient};
use crate::models::{GeneratedArticle, Job, JobParams};
use crate::queue::{JobRunner, ProgressSink};
use crate::sheets::SheetsClient;
use crate::store;

/// Runs one imported row through draft → history → document export →
/// sheet writeback. One instance serves a whole batch; per-job state
/// stays on the job.
pub struct PipelineRunner {
    pool: SqlitePool,
    generation: GenerationClient,
    docs: DocsClient,
    sheets: SheetsClient,
    spreadsheet_id: String,
    demo: bool,
}

impl PipelineRunner {
    pub fn new(
        pool: SqlitePool,
        generation: GenerationClient,
        docs: DocsClient,
        sheets: SheetsClient,
        spreadsheet_id: String,
        demo: bool,
    ) -> Self {
        Self {
            pool,
            generation,
            docs,
            sheets,
            spreadsheet_id,
            demo,
        }
    }

    /// Produce the draft for a job: generated text, the demo stand-in, or
    /// content adopted from a linked document.
    async fn draft(&self, job: &Job, log: &dyn ProgressSink) -> Result<(String, String)> {
        match &job.params {
            JobParams::Generate(request) => {
                log.emit(format!("generating draft for \"{}\"", job.keyword));
                let markdown = if self.demo {
                    generate::demo_article(request)
                } else {
                    // Keys are read here, not at enqueue time, so edits
                    // mid-batch apply to jobs not yet started.
                    let stored = store::api_key_secrets(&self.pool).await?;
                    let keys = generate::candidate_keys(&stored, generate::env_api_key());
                    self.generation
                        .generate(request, &keys)
                        .await
                        .context("generating draft")?
                };
                let title =
                    convert::first_heading(&markdown).unwrap_or_else(|| job.keyword.clone());
                Ok((title, markdown))
            }
            JobParams::Document { doc_url } => {
                log.emit(format!("loading linked document for \"{}\"", job.keyword));
                let doc_id = docs::extract_document_id(doc_url)?;
                let token = store::require_access_token(&self.pool).await?;
                let html = self
                    .docs
                    .fetch_document_html(&token, &doc_id)
                    .await
                    .context("loading linked document")?;
                let imported = convert::import_document(&html);
                let title = imported.title.unwrap_or_else(|| job.keyword.clone());
                Ok((title, imported.markdown))
            }
        }
    }
}

#[async_trait]
impl JobRunner for PipelineRunner {
    async fn run(&self, job: &Job, log: &dyn ProgressSink) -> Result<()> {
        let (title, markdown) = self.draft(job, log).await?;
        log.emit(format!("draft ready: \"{title}\""));

        // History entry exists from this point; a later export or
        // writeback failure does not lose the draft.
        let article = GeneratedArticle::new(&job.id, &job.keyword, title.clone(), markdown.clone());
        store::insert_article(&self.pool, &article).await?;

        if self.demo {
            log.emit("demo mode: skipping document export".to_string());
            log.emit("demo mode: skipping sheet writeback".to_string());
            return Ok(());
        }

        log.emit(format!("exporting \"{title}\" to the document store"));
        let token = store::require_access_token(&self.pool).await?;
        let html = convert::markdown_to_html(&markdown);
        let doc = self
            .docs
            .export_document(&token, &title, &html)
            .await
            .context("exporting document")?;
        store::attach_document(&self.pool, &article.id, &doc.id, &doc.link).await?;
        log.emit(format!("document created: {}", doc.link));

        log.emit(format!("writing link back to row {}", job.row_index + 2));
        self.sheets
            .write_result(&token, &self.spreadsheet_id, job.row_index, &doc.link)
            .await
            .context("writing result to sheet")?;
        log.emit(format!("row {} updated", job.row_index + 2));

        Ok(())
    }
}
