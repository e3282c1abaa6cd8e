//! The `list` subcommand: show registered engines.

use clap::Args;
use serde_json::json;

use crate::{engines::ENGINE_SPECS, prelude::*};

use super::write_json_output;

/// Options for the `list` subcommand.
#[derive(Args, Debug)]
pub struct ListOpts {
    /// Where to write the engine list. Defaults to standard output.
    #[clap(long, short = 'o')]
    pub output_path: Option<PathBuf>,
}

/// The `list` subcommand.
pub async fn cmd_list(opts: &ListOpts) -> Result<()> {
    let engines: Vec<Value> = ENGINE_SPECS
        .iter()
        .map(|spec| {
            json!({
                "id": spec.id,
                "class": spec.class,
                "accepts_pdf": spec.accepts_pdf,
            })
        })
        .collect();
    write_json_output(opts.output_path.as_deref(), &engines).await
}
