//! Process-wide engine registry.
//!
//! Adapter construction can be expensive (HTTP clients, credential loading),
//! so each engine is constructed once, lazily, on first use, and the instance
//! is shared across every subsequent invocation. Instances hold no
//! per-request state, so sharing them across concurrent requests is safe.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    engines::{
        OcrEngine, dummy::DummyEngine, engine_spec, gemini::GeminiEngine,
        glm::GlmOcrEngine, gpt::GptEngine, mistral::MistralEngine,
        tesseract::TesseractEngine,
    },
    normalize::TableOpts,
    prelude::*,
};

pub struct Registry {
    table_opts: TableOpts,
    engines: Mutex<HashMap<&'static str, Arc<dyn OcrEngine>>>,
}

impl Registry {
    pub fn new(table_opts: TableOpts) -> Self {
        Self {
            table_opts,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Get the engine with the given id, constructing it on first use.
    ///
    /// Construction failures (typically missing credentials) are not cached:
    /// re-construction is idempotent, and a process that gains configuration
    /// mid-life would otherwise stay broken.
    pub fn engine(&self, id: &str) -> Result<Arc<dyn OcrEngine>> {
        let spec = engine_spec(id)?;
        let mut engines = self.engines.lock().expect("lock poisoned");
        if let Some(engine) = engines.get(spec.id) {
            return Ok(engine.clone());
        }

        debug!(engine = spec.id, "constructing engine");
        let engine: Arc<dyn OcrEngine> = match spec.id {
            "dummy" => Arc::new(DummyEngine::new()?),
            "tesseract" => Arc::new(TesseractEngine::new(&self.table_opts)?),
            "glm-ocr" => Arc::new(GlmOcrEngine::new()?),
            "gemini" => Arc::new(GeminiEngine::new()?),
            "mistral" => Arc::new(MistralEngine::new()?),
            "gpt" => Arc::new(GptEngine::new()?),
            other => return Err(anyhow!("engine {:?} has no constructor", other)),
        };
        engines.insert(spec.id, engine.clone());
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_reused() {
        let registry = Registry::new(TableOpts::default());
        let first = registry.engine("dummy").unwrap();
        let second = registry.engine("dummy").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_engine_is_an_error() {
        let registry = Registry::new(TableOpts::default());
        assert!(registry.engine("no-such-engine").is_err());
    }
}
