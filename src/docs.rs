use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::{DocsConfig, duration_or};
use crate::error::DocError;

const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
const MULTIPART_BOUNDARY: &str = "galley-multipart-7b1c4e";

/// A document created in the external store.
#[derive(Debug, Clone)]
pub struct ExportedDoc {
    pub id: String,
    pub link: String,
}

/// Pull the document id out of a pasted link. Accepts `/document/d/<id>`,
/// `/file/d/<id>`, an `?id=` query parameter, or a bare id.
pub fn extract_document_id(input: &str) -> Result<String, DocError> {
    let input = input.trim();

    for marker in ["/document/d/", "/file/d/"] {
        if let Some(rest) = input.split(marker).nth(1) {
            let id = take_id(rest);
            if !id.is_empty() {
                return Ok(id);
            }
        }
    }

    if let Some(query) = input.split('?').nth(1) {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("id=") {
                let id = take_id(value);
                if !id.is_empty() {
                    return Ok(id);
                }
            }
        }
    }

    if !input.is_empty() && input.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_')) {
        return Ok(input.to_string());
    }

    Err(DocError::InvalidLink(input.to_string()))
}

fn take_id(rest: &str) -> String {
    rest.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

#[derive(Clone)]
pub struct DocsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DocsClient {
    pub fn new(config: &DocsConfig) -> Result<Self> {
        let timeout = duration_or(&config.request_timeout, std::time::Duration::from_secs(30));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building document HTTP client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Create a new document from HTML content. The upload is a two-part
    /// multipart/related body: JSON metadata, then the HTML to convert,
    /// wrapped in a minimal page shell so the conversion sees a full
    /// document.
    pub async fn export_document(
        &self,
        access_token: &str,
        title: &str,
        html: &str,
    ) -> Result<ExportedDoc, DocError> {
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink",
            self.endpoint
        );

        let metadata = serde_json::json!({ "name": title, "mimeType": DOCUMENT_MIME }).to_string();
        let body = build_multipart_body(&metadata, &html_shell(title, html), MULTIPART_BOUNDARY);

        debug!(title = %title, "exporting document");

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| DocError::Http { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DocError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| DocError::InvalidResponse(e.to_string()))?;

        let link = file
            .web_view_link
            .unwrap_or_else(|| format!("https://docs.google.com/document/d/{}/edit", file.id));

        Ok(ExportedDoc { id: file.id, link })
    }

    /// Fetch a stored document rendered as HTML.
    pub async fn fetch_document_html(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<String, DocError> {
        let url = format!(
            "{}/drive/v3/files/{}/export?mimeType=text/html",
            self.endpoint, doc_id
        );
        debug!(doc_id = %doc_id, "fetching document as HTML");

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DocError::Http { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DocError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.text().await.map_err(|e| DocError::Http { source: e })
    }
}

fn build_multipart_body(metadata: &str, html: &str, boundary: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {metadata}\r\n\
         --{boundary}\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\r\n\
         {html}\r\n\
         --{boundary}--"
    )
}

fn html_shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head>\
         <body>{body}</body></html>",
        escape_text(title)
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
