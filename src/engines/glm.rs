//! GLM-OCR, a heavy local vision model served by Ollama.
//!
//! This is the engine with an exclusive admission pool: running two copies of
//! a multi-gigabyte model on one box just makes both slower.

use std::{env, time::Duration};

use base64::{Engine as _, prelude::BASE64_STANDARD};
use image::ImageFormat;
use serde_json::json;

use crate::{normalize::clean_model_text, prelude::*, record::Line};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

/// The prompt sent alongside the image.
const OCR_PROMPT: &str = "You are an OCR engine.\n\
    Task: Extract ALL visible text from the image.\n\
    Output rules:\n\
    1) Output ONLY the extracted text.\n\
    2) Do NOT use code fences like ```.\n\
    3) Do NOT output JSON.\n\
    4) Preserve line breaks.\n";

/// Images larger than this (longest side, in pixels) are downscaled before
/// upload. Oversized images make ggml-based servers fall over.
const MAX_IMAGE_SIDE: u32 = 1280;

pub struct GlmOcrEngine {
    spec: &'static EngineSpec,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GlmOcrEngine {
    pub fn new() -> Result<Self> {
        let base_url = env::var("OLLAMA_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let model = env::var("GLM_OCR_MODEL").unwrap_or_else(|_| "glm-ocr".to_owned());
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(180))
            .build()
            .context("cannot build HTTP client for Ollama")?;
        Ok(Self {
            spec: engine_spec("glm-ocr")?,
            client,
            base_url,
            model,
        })
    }
}

#[async_trait::async_trait]
impl OcrEngine for GlmOcrEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    #[instrument(level = "debug", skip_all, fields(filename = %input.filename))]
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        if !input.mime_type.starts_with("image/") {
            return Err(anyhow!(
                "glm-ocr expects an image, got {}",
                input.mime_type
            ));
        }

        // Image decoding and resizing are CPU-bound, so keep them off the
        // async executor.
        let bytes = input.bytes.clone();
        let prepared = tokio::task::spawn_blocking(move || downscale_image(&bytes))
            .await
            .context("image preparation task panicked")??;

        let payload = json!({
            "model": self.model,
            "prompt": OCR_PROMPT,
            "images": [BASE64_STANDARD.encode(&prepared)],
            "stream": false,
            "options": { "temperature": 0 },
            "keep_alive": "0",
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Ollama request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama error {}: {}", status, body));
        }
        let raw: Value = resp.json().await.context("Ollama returned non-JSON")?;

        let text = clean_model_text(raw.get("response").and_then(Value::as_str).unwrap_or(""));
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

/// Re-encode an image as PNG, downscaling if its longest side exceeds
/// [`MAX_IMAGE_SIDE`].
fn downscale_image(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("invalid image bytes")?;
    let (w, h) = (img.width(), img.height());
    let longest = w.max(h);
    let img = if longest > MAX_IMAGE_SIDE {
        let scale = f64::from(MAX_IMAGE_SIDE) / f64::from(longest);
        img.resize(
            (f64::from(w) * scale) as u32,
            (f64::from(h) * scale) as u32,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .context("cannot re-encode image as PNG")?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscale_caps_longest_side() {
        let img = image::DynamicImage::new_rgb8(2560, 1280);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();

        let out = downscale_image(buf.get_ref()).unwrap();
        let reloaded = image::load_from_memory(&out).unwrap();
        assert_eq!(reloaded.width(), 1280);
        assert_eq!(reloaded.height(), 640);
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        assert!(downscale_image(b"definitely not an image").is_err());
    }
}
