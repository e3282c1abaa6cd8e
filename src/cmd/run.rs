//! The `run` subcommand: one engine, one document.

use clap::Args;

use crate::{
    dispatch::{Document, RasterCache, run_engine},
    normalize::TableOpts,
    prelude::*,
    raster::RasterOpts,
    registry::Registry,
};

use super::write_json_output;

/// Options for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunOpts {
    /// The document to recognize (image or PDF).
    pub input_path: PathBuf,

    /// The engine to run.
    #[clap(long, short = 'm')]
    pub model: String,

    /// Where to write the result record. Defaults to standard output.
    #[clap(long, short = 'o')]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub table_opts: TableOpts,

    #[clap(flatten)]
    pub raster_opts: RasterOpts,
}

/// The `run` subcommand.
#[instrument(level = "debug", skip_all, fields(model = %opts.model))]
pub async fn cmd_run(opts: &RunOpts) -> Result<()> {
    let registry = Registry::new(opts.table_opts.clone());
    let engine = registry.engine(&opts.model)?;
    let doc = Document::read(&opts.input_path).await?;
    let raster = RasterCache::new(opts.raster_opts.clone());

    let record = run_engine(engine, &doc, &raster).await;
    write_json_output(opts.output_path.as_deref(), &record).await?;

    // A single-engine failure is a request-level failure.
    if let Some(error) = &record.error {
        return Err(anyhow!("{} failed: {}", record.model, error));
    }
    Ok(())
}
