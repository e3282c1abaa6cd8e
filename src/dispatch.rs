//! Routing a document to engines and normalizing outcomes.
//!
//! This is where timing, format conversion, default-filling, billing
//! attachment, and failure isolation all happen, so that adapters only have
//! to worry about talking to their backend.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use futures::future;
use tokio::sync::{OnceCell, Semaphore};

use crate::{
    billing::build_billing,
    engines::{ENGINE_SPECS, EngineClass, EngineInput, OcrEngine},
    prelude::*,
    raster::{RasterOpts, pdf_first_page_to_png},
    record::OcrRecord,
    registry::Registry,
};

/// An uploaded document, as received from the request boundary.
#[derive(Clone, Debug)]
pub struct Document {
    pub bytes: Arc<Vec<u8>>,
    pub filename: String,
    pub mime_type: String,
}

impl Document {
    /// Read a document from disk, guessing the MIME type from the extension.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_owned();
        Ok(Self {
            bytes: Arc::new(bytes),
            filename,
            mime_type,
        })
    }

    fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }
}

/// Lazily-shared first-page rasterization.
///
/// In a multi-engine benchmark several image-only engines need the same PDF
/// page; the conversion runs at most once per request, and its outcome
/// (success or failure) is shared by all of them.
pub struct RasterCache {
    opts: RasterOpts,
    cell: OnceCell<std::result::Result<Arc<Vec<u8>>, String>>,
}

impl RasterCache {
    pub fn new(opts: RasterOpts) -> Self {
        Self {
            opts,
            cell: OnceCell::new(),
        }
    }

    async fn first_page_png(&self, doc: &Document) -> Result<Arc<Vec<u8>>> {
        let result = self
            .cell
            .get_or_init(|| async {
                pdf_first_page_to_png(&doc.bytes, &self.opts)
                    .await
                    .map(Arc::new)
                    .map_err(|err| format!("{:?}", err))
            })
            .await;
        result.clone().map_err(|err| anyhow!(err))
    }
}

/// Bounded admission for the engine classes that need it.
///
/// Remote APIs share a small pool so a benchmark doesn't trip provider rate
/// limits; the heavy local model gets an exclusive pool so it never contends
/// with itself. Permits are scoped, so they're released on failure too.
pub struct Admission {
    remote: Semaphore,
    heavy: Semaphore,
}

/// Default concurrent invocations allowed across all remote-API engines.
const REMOTE_CONCURRENCY: usize = 2;

impl Default for Admission {
    fn default() -> Self {
        Self {
            remote: Semaphore::new(REMOTE_CONCURRENCY),
            heavy: Semaphore::new(1),
        }
    }
}

impl Admission {
    async fn acquire(&self, class: EngineClass) -> Option<tokio::sync::SemaphorePermit<'_>> {
        let pool = match class {
            EngineClass::Local => return None,
            EngineClass::HeavyLocal => &self.heavy,
            EngineClass::RemoteApi => &self.remote,
        };
        Some(pool.acquire().await.expect("admission pool closed"))
    }
}

/// Run one engine against one document, producing a structurally complete
/// record whatever happens.
#[instrument(level = "debug", skip_all, fields(engine = engine.spec().id))]
pub async fn run_engine(
    engine: Arc<dyn OcrEngine>,
    doc: &Document,
    raster: &RasterCache,
) -> OcrRecord {
    let spec = engine.spec();
    let start = Instant::now();

    // Image-only engines get the first PDF page as a PNG.
    let input = if doc.is_pdf() && !spec.accepts_pdf {
        match raster.first_page_png(doc).await {
            Ok(bytes) => EngineInput {
                bytes,
                filename: format!("{} (page1).png", doc.filename),
                mime_type: "image/png".to_owned(),
            },
            Err(err) => {
                let elapsed = start.elapsed().as_millis() as u64;
                return OcrRecord::failed(
                    spec.id,
                    &doc.filename,
                    &doc.mime_type,
                    elapsed,
                    &err.context("PDF rasterization failed"),
                );
            }
        }
    } else {
        EngineInput {
            bytes: doc.bytes.clone(),
            filename: doc.filename.clone(),
            mime_type: doc.mime_type.clone(),
        }
    };

    match engine.recognize(&input).await {
        Ok(output) => {
            let elapsed = start.elapsed().as_millis() as u64;
            let latency_ms = output.latency_ms.unwrap_or(elapsed);
            let billing = output
                .billing
                .unwrap_or_else(|| build_billing(spec.id, latency_ms, output.token_usage));
            OcrRecord {
                model: spec.id.to_owned(),
                filename: input.filename,
                mime_type: input.mime_type,
                line_count: output.lines.len(),
                text: output.text,
                lines: output.lines,
                backend_latency_ms: elapsed,
                latency_ms,
                raw: output.raw,
                billing: Some(billing),
                error: None,
            }
        }
        Err(err) => {
            let elapsed = start.elapsed().as_millis() as u64;
            warn!(engine = spec.id, error = ?err, "engine invocation failed");
            OcrRecord::failed(spec.id, &input.filename, &input.mime_type, elapsed, &err)
        }
    }
}

/// Fan a document out across a set of engines.
///
/// Takes construction outcomes rather than engines so that an engine whose
/// constructor failed (missing credentials, say) still gets its slot in the
/// result map instead of sinking the whole benchmark. There is no ordering
/// guarantee between engines; the map is keyed by engine id.
pub async fn run_engines(
    engines: Vec<(&'static str, Result<Arc<dyn OcrEngine>>)>,
    doc: &Document,
    raster: &RasterCache,
) -> BTreeMap<String, OcrRecord> {
    let admission = Admission::default();
    let invocations = engines.into_iter().map(|(id, engine)| {
        let admission = &admission;
        async move {
            let record = match engine {
                Ok(engine) => {
                    let _permit = admission.acquire(engine.spec().class).await;
                    run_engine(engine, doc, raster).await
                }
                Err(err) => {
                    warn!(engine = id, error = ?err, "engine unavailable");
                    OcrRecord::failed(id, &doc.filename, &doc.mime_type, 0, &err)
                }
            };
            (id.to_owned(), record)
        }
    });
    future::join_all(invocations).await.into_iter().collect()
}

/// Run every registered engine, constructing each through the registry.
pub async fn run_all(
    registry: &Registry,
    doc: &Document,
    raster: &RasterCache,
) -> BTreeMap<String, OcrRecord> {
    let engines = ENGINE_SPECS
        .iter()
        .map(|spec| (spec.id, registry.engine(spec.id)))
        .collect();
    run_engines(engines, doc, raster).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engines::{EngineOutput, EngineSpec},
        raster::RasterOpts,
        record::Line,
    };

    static OK_SPEC: EngineSpec = EngineSpec {
        id: "fake-ok",
        class: EngineClass::Local,
        accepts_pdf: true,
    };
    static BOOM_SPEC: EngineSpec = EngineSpec {
        id: "fake-boom",
        class: EngineClass::RemoteApi,
        accepts_pdf: true,
    };

    struct OkEngine;

    #[async_trait::async_trait]
    impl OcrEngine for OkEngine {
        fn spec(&self) -> &'static EngineSpec {
            &OK_SPEC
        }

        async fn recognize(&self, _input: &EngineInput) -> Result<EngineOutput> {
            Ok(EngineOutput {
                text: "hello".to_owned(),
                lines: vec![Line::bare("hello")],
                ..EngineOutput::default()
            })
        }
    }

    struct BoomEngine;

    #[async_trait::async_trait]
    impl OcrEngine for BoomEngine {
        fn spec(&self) -> &'static EngineSpec {
            &BOOM_SPEC
        }

        async fn recognize(&self, _input: &EngineInput) -> Result<EngineOutput> {
            Err(anyhow!("backend exploded"))
        }
    }

    fn doc() -> Document {
        Document {
            bytes: Arc::new(b"fake image".to_vec()),
            filename: "doc.png".to_owned(),
            mime_type: "image/png".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_fanout_isolates_failures() {
        let engines: Vec<(&'static str, Result<Arc<dyn OcrEngine>>)> = vec![
            ("fake-ok", Ok(Arc::new(OkEngine) as Arc<dyn OcrEngine>)),
            ("fake-boom", Ok(Arc::new(BoomEngine) as Arc<dyn OcrEngine>)),
            ("unconfigured", Err(anyhow!("API_KEY missing"))),
        ];
        let raster = RasterCache::new(RasterOpts::default());
        let results = run_engines(engines, &doc(), &raster).await;

        assert_eq!(results.len(), 3);

        let ok = &results["fake-ok"];
        assert_eq!(ok.text, "hello");
        assert_eq!(ok.line_count, 1);
        assert_eq!(ok.error, None);
        assert!(ok.billing.is_some());

        let boom = &results["fake-boom"];
        assert!(boom.text.is_empty());
        assert!(boom.error.as_deref().unwrap().contains("backend exploded"));

        let missing = &results["unconfigured"];
        assert!(missing.error.as_deref().unwrap().contains("API_KEY missing"));
    }

    #[tokio::test]
    async fn test_run_engine_fills_defaults() {
        let raster = RasterCache::new(RasterOpts::default());
        let record = run_engine(Arc::new(OkEngine), &doc(), &raster).await;
        assert_eq!(record.model, "fake-ok");
        assert_eq!(record.filename, "doc.png");
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(record.line_count, record.lines.len());
        assert_eq!(record.backend_latency_ms, record.latency_ms);
    }
}
