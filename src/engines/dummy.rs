//! A placeholder engine that recognizes nothing.
//!
//! Useful for wiring tests and for exercising the dispatcher without any
//! external tools or credentials.

use crate::{prelude::*, record::Line};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

pub struct DummyEngine {
    spec: &'static EngineSpec,
}

impl DummyEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            spec: engine_spec("dummy")?,
        })
    }
}

#[async_trait::async_trait]
impl OcrEngine for DummyEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        let text = format!("dummy output for {}", input.filename);
        Ok(EngineOutput {
            lines: vec![Line::bare(&text)],
            text,
            ..EngineOutput::default()
        })
    }
}
