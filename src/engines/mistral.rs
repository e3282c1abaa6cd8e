//! Mistral document-AI OCR over its REST endpoint.
//!
//! The endpoint takes the whole document as a `data:` URL and returns
//! per-page Markdown, so there's no table reconstruction to do on our side.

use std::{env, time::Duration};

use serde_json::json;

use crate::{
    data_url::data_url,
    prelude::*,
    record::Line,
    retry::{
        EngineRetryResult, IsKnownTransient, linear_backoff, resolve,
        retry_result_fatal, retry_result_ok, try_fatal, try_potentially_transient,
    },
};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(600);
const MAX_RETRIES: usize = 2;

pub struct MistralEngine {
    spec: &'static EngineSpec,
    client: reqwest::Client,
    endpoint: String,
    token: String,
    model: String,
}

impl MistralEngine {
    pub fn new() -> Result<Self> {
        let endpoint = clean_endpoint(&env::var("MISTRAL_OCR_ENDPOINT").unwrap_or_default());
        if endpoint.is_empty() {
            return Err(anyhow!("MISTRAL_OCR_ENDPOINT missing in environment (.env)"));
        }
        let token = clean_env_value(&env::var("MISTRAL_OCR_TOKEN").unwrap_or_default());
        if token.is_empty() {
            return Err(anyhow!("MISTRAL_OCR_TOKEN missing in environment (.env)"));
        }
        let model = clean_env_value(
            &env::var("MISTRAL_OCR_MODEL")
                .unwrap_or_else(|_| "mistral-document-ai-2505".to_owned()),
        );

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("cannot build HTTP client for Mistral")?;
        Ok(Self {
            spec: engine_spec("mistral")?,
            client,
            endpoint,
            token,
            model,
        })
    }

    /// One request attempt, classified for retrying.
    async fn request_once(&self, payload: &Value) -> EngineRetryResult<Value> {
        let resp = try_potentially_transient!(
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .json(payload)
                .send()
                .await
        );
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let error = anyhow!("Mistral OCR HTTP {}: {}", status, truncate(&body, 2000));
            if status.is_known_transient() {
                return EngineRetryResult::Transient { input: (), error };
            }
            return retry_result_fatal(error);
        }
        let data: Value =
            try_fatal!(resp.json().await.context("Mistral OCR returned non-JSON"));
        retry_result_ok(data)
    }
}

#[async_trait::async_trait]
impl OcrEngine for MistralEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    #[instrument(level = "debug", skip_all, fields(filename = %input.filename))]
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        let mime_type = if input.mime_type.is_empty() {
            "image/png"
        } else {
            &input.mime_type
        };
        let payload = json!({
            "model": self.model,
            "document": {
                "type": "document_url",
                "document_url": data_url(mime_type, &input.bytes),
            },
            "include_image_base64": true,
        });

        let raw = resolve(
            "mistral",
            self.request_once(&payload)
                .await
                .retry_with_async(|_| self.request_once(&payload))
                .with_delays(linear_backoff(RETRY_BACKOFF_BASE, MAX_RETRIES))
                .await,
        )?;

        let text = extract_text(&raw);
        let lines = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Line::bare)
            .collect();

        Ok(EngineOutput {
            text,
            lines,
            raw: Some(raw),
            ..EngineOutput::default()
        })
    }
}

/// Join per-page Markdown, falling back to flat text keys some deployments
/// return instead.
fn extract_text(raw: &Value) -> String {
    if let Some(pages) = raw.get("pages").and_then(Value::as_array) {
        let chunks: Vec<&str> = pages
            .iter()
            .filter_map(|page| page.get("markdown").and_then(Value::as_str))
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .collect();
        if !chunks.is_empty() {
            return chunks.join("\n\n");
        }
    }
    for key in ["text", "extracted_text", "content"] {
        if let Some(text) = raw.get(key).and_then(Value::as_str) {
            let text = text.trim();
            if !text.is_empty() {
                return text.to_owned();
            }
        }
    }
    String::new()
}

/// Fix common endpoint copy/paste damage: surrounding quotes, URL-encoded
/// quotes, trailing slashes.
fn clean_endpoint(raw: &str) -> String {
    clean_env_value(&raw.replace("%27", ""))
        .trim_end_matches('/')
        .to_owned()
}

fn clean_env_value(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_owned()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_prefers_page_markdown() {
        let raw = json!({
            "pages": [
                { "markdown": "# Page one" },
                { "markdown": "  " },
                { "markdown": "Page two" },
            ],
            "text": "ignored",
        });
        assert_eq!(extract_text(&raw), "# Page one\n\nPage two");
    }

    #[test]
    fn test_extract_text_fallback_keys() {
        assert_eq!(extract_text(&json!({ "extracted_text": " hi " })), "hi");
        assert_eq!(extract_text(&json!({})), "");
    }

    #[test]
    fn test_clean_endpoint() {
        assert_eq!(
            clean_endpoint(" \"https://host/v1/ocr%27/\" "),
            "https://host/v1/ocr"
        );
    }
}
