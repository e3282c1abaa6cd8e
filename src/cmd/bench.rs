//! The `bench` subcommand: fan one document out across every engine.

use clap::Args;

use crate::{
    dispatch::{Document, RasterCache, run_all},
    normalize::TableOpts,
    prelude::*,
    raster::RasterOpts,
    registry::Registry,
};

use super::write_json_output;

/// Options for the `bench` subcommand.
#[derive(Args, Debug)]
pub struct BenchOpts {
    /// The document to recognize (image or PDF).
    pub input_path: PathBuf,

    /// Where to write the results map. Defaults to standard output.
    #[clap(long, short = 'o')]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub table_opts: TableOpts,

    #[clap(flatten)]
    pub raster_opts: RasterOpts,
}

/// The `bench` subcommand.
///
/// Always produces one record per registered engine; engines that fail (or
/// can't be constructed) carry an `error` field instead of content.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_bench(opts: &BenchOpts) -> Result<()> {
    let registry = Registry::new(opts.table_opts.clone());
    let doc = Document::read(&opts.input_path).await?;
    let raster = RasterCache::new(opts.raster_opts.clone());

    let results = run_all(&registry, &doc, &raster).await;
    let failed = results.values().filter(|r| r.error.is_some()).count();
    info!(
        engines = results.len(),
        failed, "benchmark complete"
    );
    write_json_output(opts.output_path.as_deref(), &results).await
}
