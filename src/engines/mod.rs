//! OCR engine adapters.
//!
//! Every backend, from a local `tesseract` subprocess to an Azure-hosted
//! vision model, is exposed through the same [`OcrEngine`] trait. Adapters
//! return a partially-filled [`EngineOutput`]; the dispatcher fills in
//! defaults and attaches billing. Adapters hold no per-request state, so one
//! instance is safely shared across concurrent invocations.

use std::sync::Arc;

use schemars::JsonSchema;

use crate::{
    billing::{Billing, TokenUsage},
    prelude::*,
    record::Line,
};

pub mod dummy;
pub mod gemini;
pub mod glm;
pub mod gpt;
pub mod mistral;
pub mod tesseract;

/// Which admission pool an engine's invocations run under.
///
/// This also replaces runtime "does it have an async variant?" probing: the
/// class is fixed at registration. `RemoteApi` engines do non-blocking I/O
/// directly; the others push their CPU-bound work onto the blocking pool.
#[derive(Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineClass {
    /// Cheap local engines. Unbounded relative to each other.
    Local,

    /// The one heavy local model. Exclusive admission (concurrency 1) so it
    /// never contends with itself.
    HeavyLocal,

    /// Remote HTTP APIs. Share a small admission pool to stay under provider
    /// rate limits.
    RemoteApi,
}

/// Static registration data for one engine.
#[derive(Clone, Copy, Debug)]
pub struct EngineSpec {
    /// Stable engine identifier, used as the `model` field of results.
    pub id: &'static str,

    /// The admission class.
    pub class: EngineClass,

    /// Can this engine consume paginated PDFs directly? If not, the
    /// dispatcher rasterizes the first page before invoking it.
    pub accepts_pdf: bool,
}

/// All engines this build knows about.
pub const ENGINE_SPECS: &[EngineSpec] = &[
    EngineSpec {
        id: "dummy",
        class: EngineClass::Local,
        accepts_pdf: false,
    },
    EngineSpec {
        id: "tesseract",
        class: EngineClass::Local,
        accepts_pdf: false,
    },
    EngineSpec {
        id: "glm-ocr",
        class: EngineClass::HeavyLocal,
        accepts_pdf: false,
    },
    EngineSpec {
        id: "gemini",
        class: EngineClass::RemoteApi,
        accepts_pdf: true,
    },
    EngineSpec {
        id: "mistral",
        class: EngineClass::RemoteApi,
        accepts_pdf: true,
    },
    EngineSpec {
        id: "gpt",
        class: EngineClass::RemoteApi,
        accepts_pdf: false,
    },
];

/// Look up a spec by engine id.
pub fn engine_spec(id: &str) -> Result<&'static EngineSpec> {
    ENGINE_SPECS
        .iter()
        .find(|spec| spec.id == id)
        .ok_or_else(|| {
            anyhow!(
                "unknown engine {:?} (known: {})",
                id,
                ENGINE_SPECS
                    .iter()
                    .map(|s| s.id)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}

/// The document an engine is asked to recognize.
///
/// `bytes` is the one and only parameter carrying document data. The bytes
/// are shared so that a multi-engine benchmark doesn't copy the document per
/// engine.
#[derive(Clone, Debug)]
pub struct EngineInput {
    /// The document bytes (raster image, or PDF for engines that accept it).
    pub bytes: Arc<Vec<u8>>,

    /// The effective filename, for echoing into results.
    pub filename: String,

    /// The effective MIME type of `bytes`.
    pub mime_type: String,
}

/// What an adapter returns: the engine-specific part of a result record.
///
/// The dispatcher merges this with defaults (model id, filename, MIME type,
/// measured latency) without overwriting anything set here.
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Markdown-normalized extracted text.
    pub text: String,

    /// Display lines, in the engine's reading order.
    pub lines: Vec<Line>,

    /// Engine-native response, for debugging. Must be JSON-safe.
    pub raw: Option<Value>,

    /// Latency measured by the adapter itself, when it has a better number
    /// than the dispatcher's wall clock.
    pub latency_ms: Option<u64>,

    /// Token usage, for LLM-backed engines.
    pub token_usage: Option<TokenUsage>,

    /// A billing record, when the engine computes its own. Passed through
    /// unchanged by the billing collaborator.
    pub billing: Option<Billing>,
}

/// Interface to an OCR engine.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// This engine's registration data.
    fn spec(&self) -> &'static EngineSpec;

    /// Recognize one document.
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput>;
}
