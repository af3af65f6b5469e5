use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{GenerationConfig, duration_or};
use crate::error::GenerationError;
use crate::models::GenerationRequest;

/// Fixed task prompt. The anchor-link requirement is an instruction to the
/// provider; the output is not rewritten if the model ignores it (a missing
/// anchor is logged, see `GenerationClient::generate`).
const PROMPT_TEMPLATE: &str = "\
You are an experienced SEO copywriter for a website in the {host_niche} niche.

Write a complete article in {language} about \"{keyword}\".

Requirements:
- Length between {min_words} and {max_words} words.
- Markdown format: one top-level heading with the article title, then \
subheadings (##) structuring the text for search engines.
- Exactly once in the body, embed the phrase \"{anchor_text}\" as a markdown \
link to {target_url}. The link must appear naturally in a sentence that fits \
the {target_niche} topic.
- No placeholder text, no notes to the editor. Output the article only.";

pub fn build_prompt(request: &GenerationRequest, config: &GenerationConfig) -> String {
    PROMPT_TEMPLATE
        .replace("{host_niche}", request.host_niche.trim())
        .replace("{language}", config.language.trim())
        .replace("{keyword}", request.keyword.trim())
        .replace("{min_words}", &config.min_words.to_string())
        .replace("{max_words}", &config.max_words.to_string())
        .replace("{anchor_text}", request.anchor_text.trim())
        .replace("{target_url}", request.target_url.trim())
        .replace("{target_niche}", request.target_niche.trim())
}

/// Build the candidate key list for one generation call: stored keys in
/// order, de-duplicated, with the environment key appended if not already
/// present. Rotation state never outlives the call.
pub fn candidate_keys(stored: &[String], env_key: Option<String>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in stored {
        let key = key.trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    if let Some(env_key) = env_key {
        let env_key = env_key.trim().to_string();
        if !env_key.is_empty() && !keys.iter().any(|k| *k == env_key) {
            keys.push(env_key);
        }
    }
    keys
}

pub fn env_api_key() -> Option<String> {
    std::env::var("GALLEY_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

pub struct GenerationClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let timeout = duration_or(&config.request_timeout, std::time::Duration::from_secs(30));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Http { source: e })?;
        Ok(Self { http, config })
    }

    /// Request an article draft, rotating through `keys` in order. The first
    /// key that yields non-empty text wins; a failed key is not retried
    /// within this call. With every key exhausted, the last error is
    /// returned.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        keys: &[String],
    ) -> Result<String, GenerationError> {
        if keys.is_empty() {
            return Err(GenerationError::NoApiKeys);
        }

        let prompt = build_prompt(request, &self.config);
        let mut last_error = GenerationError::NoApiKeys;

        for (attempt, key) in keys.iter().enumerate() {
            debug!(
                attempt = attempt + 1,
                of = keys.len(),
                keyword = %request.keyword,
                "requesting article draft"
            );
            match self.attempt(&prompt, key).await {
                Ok(text) => {
                    let anchor = format!("[{}]({})", request.anchor_text, request.target_url);
                    if !text.contains(&anchor) {
                        warn!(keyword = %request.keyword, "draft is missing the required anchor link");
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "generation attempt failed, rotating to next key");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn attempt(&self, prompt: &str, key: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens },
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Http { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }

        Ok(text)
    }
}

/// Canned draft used in demo mode: same shape as a real draft (title
/// heading, sections, the anchor link) without any provider call.
pub fn demo_article(request: &GenerationRequest) -> String {
    let keyword = request.keyword.trim();
    format!(
        "# {keyword}: A Practical Guide\n\n\
         This demo draft stands in for generated content about {keyword}. It follows the \
         same structure a real article would: an introduction, a few sections, and one \
         anchor link placed in the body text.\n\n\
         ## Why {keyword} matters\n\n\
         Readers in the {host} space keep running into this topic, and most articles \
         gloss over the details. For a deeper look at the {target} side, see \
         [{anchor}]({url}) before drawing your own conclusions.\n\n\
         ## Getting started\n\n\
         - Pick one concrete goal before touching any tools.\n\
         - Write down what you already know about {keyword}.\n\
         - Revisit the plan after the first week.\n\n\
         ## Closing thoughts\n\n\
         Demo mode skips the text provider entirely, so this draft is generated \
         locally and is always the same for the same inputs.",
        keyword = keyword,
        host = request.host_niche.trim(),
        target = request.target_niche.trim(),
        anchor = request.anchor_text.trim(),
        url = request.target_url.trim(),
    )
}
