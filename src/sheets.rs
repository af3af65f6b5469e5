use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{SheetsConfig, duration_or};
use crate::error::SheetError;
use crate::models::{GenerationRequest, ImportedRow};

/// How the imported columns are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    /// A=keyword, B=host niche, C=target URL, D=anchor text, E=target niche.
    Generation,
    /// A=keyword, B=target site URL, C=source document link.
    Direct,
}

impl WorkflowMode {
    /// Import range, starting below the header row.
    fn import_range(self) -> &'static str {
        match self {
            WorkflowMode::Generation => "A2:E",
            WorkflowMode::Direct => "A2:C",
        }
    }
}

impl std::str::FromStr for WorkflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generation" => Ok(WorkflowMode::Generation),
            "direct" => Ok(WorkflowMode::Direct),
            other => Err(format!(
                "unknown workflow mode '{other}' (expected 'generation' or 'direct')"
            )),
        }
    }
}

/// Cell range the result link is written to: header row offset plus
/// zero-based row index. Row 0 lands in row 2.
pub fn result_range(column: &str, row_index: u32) -> String {
    format!("{column}{}", row_index + 2)
}

/// Accept either a bare spreadsheet id or a full pasted URL.
pub fn extract_spreadsheet_id(input: &str) -> String {
    let input = input.trim();
    if let Some(rest) = input.split("/spreadsheets/d/").nth(1) {
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .collect();
        if !id.is_empty() {
            return id;
        }
    }
    input.to_string()
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsClient {
    http: reqwest::Client,
    endpoint: String,
    result_column: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let timeout = duration_or(&config.request_timeout, std::time::Duration::from_secs(30));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building spreadsheet HTTP client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            result_column: config.result_column.clone(),
        })
    }

    /// Read the data rows of a spreadsheet (row 1 is reserved for headers)
    /// and interpret them per workflow mode. Rows with missing required
    /// cells are skipped with a warning, not treated as failures.
    pub async fn read_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        mode: WorkflowMode,
    ) -> Result<Vec<ImportedRow>, SheetError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.endpoint,
            spreadsheet_id,
            mode.import_range()
        );
        debug!(url = %url, "reading spreadsheet rows");

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SheetError::Http {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SheetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| SheetError::Shape(e.to_string()))?;

        Ok(parse_rows(&range.values, mode))
    }

    /// Write the exported document link back to the originating row.
    pub async fn write_result(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        row_index: u32,
        link: &str,
    ) -> Result<(), SheetError> {
        let range = result_range(&self.result_column, row_index);
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}?valueInputOption=RAW",
            self.endpoint, spreadsheet_id, range
        );
        debug!(range = %range, "writing result link back to sheet");

        let body = json!({ "values": [[link]] });

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SheetError::Http {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SheetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

fn parse_rows(values: &[Vec<serde_json::Value>], mode: WorkflowMode) -> Vec<ImportedRow> {
    let mut rows = Vec::new();

    for (index, row) in values.iter().enumerate() {
        let row_index = index as u32;
        match mode {
            WorkflowMode::Generation => {
                let parsed = (
                    cell(row, 0),
                    cell(row, 1),
                    cell(row, 2),
                    cell(row, 3),
                    cell(row, 4),
                );
                match parsed {
                    (Some(keyword), Some(host), Some(url), Some(anchor), Some(niche)) => {
                        rows.push(ImportedRow::Generation {
                            row_index,
                            request: GenerationRequest {
                                keyword: keyword.to_string(),
                                host_niche: host.to_string(),
                                target_url: url.to_string(),
                                anchor_text: anchor.to_string(),
                                target_niche: niche.to_string(),
                            },
                        });
                    }
                    _ => {
                        warn!(row = row_index + 2, "skipping row with missing cells");
                    }
                }
            }
            WorkflowMode::Direct => match (cell(row, 0), cell(row, 1)) {
                (Some(keyword), Some(site_url)) => {
                    rows.push(ImportedRow::Direct {
                        row_index,
                        keyword: keyword.to_string(),
                        site_url: site_url.to_string(),
                        doc_url: cell(row, 2).map(str::to_string),
                    });
                }
                _ => {
                    warn!(row = row_index + 2, "skipping row with missing cells");
                }
            },
        }
    }

    rows
}

fn cell(row: &[serde_json::Value], index: usize) -> Option<&str> {
    row.get(index)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
