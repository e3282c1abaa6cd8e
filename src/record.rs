//! The normalized result record every engine produces.

use schemars::JsonSchema;

use crate::{billing::Billing, prelude::*};

/// One display-oriented line of recognized text.
///
/// `score` is an explicit option: `None` means the engine provides no
/// confidence at all (LLM-based engines), which is not the same thing as a
/// confidence of zero.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Line {
    /// The recognized text.
    pub text: String,

    /// Per-detection confidence, when the engine reports one.
    pub score: Option<f64>,

    /// The bounding box as `[x, y]` points, when the engine reports one.
    #[serde(rename = "box")]
    pub box_points: Option<Vec<[f64; 2]>>,
}

impl Line {
    /// A line with no geometry and no confidence.
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
            box_points: None,
        }
    }
}

/// The canonical output record for one (engine, document) pair.
///
/// Structurally complete by construction: every required key is present and
/// defaulted rather than omitted, so consumers can treat the union of all
/// engines' records polymorphically. `error` is the only field signalling
/// failure; when it's set the content fields hold their defaults.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct OcrRecord {
    /// Stable engine identifier.
    pub model: String,

    /// Effective filename, after any format conversion.
    pub filename: String,

    /// Effective MIME type, after any format conversion.
    pub mime_type: String,

    /// Final Markdown-normalized extracted text.
    pub text: String,

    /// Display lines, in the engine's reading order.
    pub lines: Vec<Line>,

    /// Always equals `lines.len()`.
    pub line_count: usize,

    /// Wall-clock duration of the adapter invocation, in milliseconds,
    /// measured by the dispatcher.
    pub backend_latency_ms: u64,

    /// The adapter's own latency measurement when it reports one, otherwise
    /// the same dispatcher measurement as `backend_latency_ms`.
    pub latency_ms: u64,

    /// Engine-native response, retained for debugging. Always JSON-safe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,

    /// Cost estimate attached by the billing collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<Billing>,

    /// Present only when the adapter invocation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrRecord {
    /// An empty-but-complete record for the given engine and document.
    pub fn defaults(model: &str, filename: &str, mime_type: &str) -> Self {
        Self {
            model: model.to_owned(),
            filename: filename.to_owned(),
            mime_type: mime_type.to_owned(),
            text: String::new(),
            lines: vec![],
            line_count: 0,
            backend_latency_ms: 0,
            latency_ms: 0,
            raw: None,
            billing: None,
            error: None,
        }
    }

    /// A failure record carrying the elapsed time up to the failure.
    pub fn failed(
        model: &str,
        filename: &str,
        mime_type: &str,
        latency_ms: u64,
        error: &anyhow::Error,
    ) -> Self {
        let mut record = Self::defaults(model, filename, mime_type);
        record.backend_latency_ms = latency_ms;
        record.latency_ms = latency_ms;
        record.error = Some(format!("{:?}", error));
        record
    }
}
