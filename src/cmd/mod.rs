//! CLI subcommands.

use crate::prelude::*;

pub mod bench;
pub mod list;
pub mod run;
pub mod schema;

/// Write pretty-printed JSON to a [`Path`] or to standard output.
pub async fn write_json_output(path: Option<&Path>, value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("cannot serialize output")?;
    match path {
        Some(path) => tokio::fs::write(path, format!("{}\n", json))
            .await
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
