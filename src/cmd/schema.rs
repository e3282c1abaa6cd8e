//! The `schema` subcommand: print the output record schema.

use clap::Args;
use schemars::schema_for;

use crate::{prelude::*, record::OcrRecord};

use super::write_json_output;

/// Options for the `schema` subcommand.
#[derive(Args, Debug)]
pub struct SchemaOpts {
    /// Where to write the schema. Defaults to standard output.
    #[clap(long, short = 'o')]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
///
/// Consumers integrating against the benchmark (UIs, metric collectors) can
/// validate records against this.
pub async fn cmd_schema(opts: &SchemaOpts) -> Result<()> {
    let schema = schema_for!(OcrRecord);
    write_json_output(opts.output_path.as_deref(), &schema).await
}
