//! Gemini OCR over the REST `generateContent` endpoint.
//!
//! Gemini accepts both images and PDFs inline, so this engine never needs
//! rasterization. Requests carry hard connect/read timeouts so the benchmark
//! never hangs on a stalled connection, and transient failures are retried a
//! bounded number of times with linearly increasing backoff.

use std::{env, time::Duration};

use base64::{Engine as _, prelude::BASE64_STANDARD};
use serde_json::json;

use crate::{
    normalize::clean_model_text,
    prelude::*,
    record::Line,
    retry::{
        EngineRetryResult, IsKnownTransient, linear_backoff, resolve,
        retry_result_fatal, retry_result_ok, try_fatal, try_potentially_transient,
    },
};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

const OCR_PROMPT: &str = "You are an OCR engine.\n\
    Task: Extract ALL visible text from the document EXACTLY as it appears.\n\
    Rules:\n\
    1) Output ONLY the extracted text.\n\
    2) Do NOT include code fences like ```.\n\
    3) Preserve line breaks.\n";

/// Base delay for the linear retry backoff.
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(600);

pub struct GeminiEngine {
    spec: &'static EngineSpec,
    client: reqwest::Client,
    api_key: String,
    model_id: String,
    max_retries: usize,
}

impl GeminiEngine {
    /// Create a new Gemini engine. Fails immediately when the API key is
    /// missing; that's a configuration error, not something to retry.
    pub fn new() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("GEMINI_API_KEY missing in environment (.env)"))?;
        let model_id = env::var("GEMINI_MODEL_ID")
            .unwrap_or_else(|_| "gemini-2.0-flash".to_owned());
        let connect_timeout = env_seconds("GEMINI_CONNECT_TIMEOUT", 10);
        let read_timeout = env_seconds("GEMINI_READ_TIMEOUT", 60);
        let max_retries = env::var("GEMINI_MAX_RETRIES")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(2);

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .context("cannot build HTTP client for Gemini")?;
        Ok(Self {
            spec: engine_spec("gemini")?,
            client,
            api_key,
            model_id,
            max_retries,
        })
    }

    /// One request attempt, classified for retrying.
    async fn request_once(&self, payload: &Value) -> EngineRetryResult<Value> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model_id, self.api_key,
        );
        let resp = try_potentially_transient!(
            self.client.post(&url).json(payload).send().await
        );
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let error = anyhow!("Gemini HTTP {}: {}", status, body);
            if status.is_known_transient() {
                return EngineRetryResult::Transient { input: (), error };
            }
            return retry_result_fatal(error);
        }
        let data: Value =
            try_fatal!(resp.json().await.context("Gemini returned non-JSON"));
        retry_result_ok(data)
    }
}

#[async_trait::async_trait]
impl OcrEngine for GeminiEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    #[instrument(level = "debug", skip_all, fields(filename = %input.filename))]
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        if !input.mime_type.starts_with("image/")
            && input.mime_type != "application/pdf"
        {
            return Err(anyhow!(
                "gemini expects image/* or application/pdf, got {}",
                input.mime_type
            ));
        }

        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": input.mime_type,
                            "data": BASE64_STANDARD.encode(input.bytes.as_slice()),
                        }
                    },
                    { "text": OCR_PROMPT },
                ],
            }],
            "generationConfig": {
                "temperature": 0.0,
                "topP": 1.0,
                "maxOutputTokens": 4096,
            },
        });

        let raw = resolve(
            "gemini",
            self.request_once(&payload)
                .await
                .retry_with_async(|_| self.request_once(&payload))
                .with_delays(linear_backoff(RETRY_BACKOFF_BASE, self.max_retries))
                .await,
        )?;

        let text = clean_model_text(&extract_text(&raw));
        let lines = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Line::bare)
            .collect();
        let token_usage = extract_token_usage(&raw);

        Ok(EngineOutput {
            text,
            lines,
            raw: Some(raw),
            token_usage,
            ..EngineOutput::default()
        })
    }
}

/// Join the text parts of the first candidate.
fn extract_text(raw: &Value) -> String {
    let parts = raw
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull token usage out of `usageMetadata`, when present.
fn extract_token_usage(raw: &Value) -> Option<crate::billing::TokenUsage> {
    let usage = raw.get("usageMetadata")?;
    Some(crate::billing::TokenUsage {
        input_tokens: usage.get("promptTokenCount")?.as_u64()?,
        output_tokens: usage
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    })
}

fn env_seconds(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(name)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_joins_parts() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "a" }, { "text": "b" }] },
            }],
        });
        assert_eq!(extract_text(&raw), "a\nb");
    }

    #[test]
    fn test_extract_text_tolerates_empty_response() {
        assert_eq!(extract_text(&json!({})), "");
        assert_eq!(extract_text(&json!({ "candidates": [] })), "");
    }

    #[test]
    fn test_extract_token_usage() {
        let raw = json!({
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 4 },
        });
        let usage = extract_token_usage(&raw).unwrap();
        assert_eq!((usage.input_tokens, usage.output_tokens), (10, 4));
        assert_eq!(extract_token_usage(&json!({})), None);
    }
}
