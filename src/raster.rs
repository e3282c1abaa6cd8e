//! Rasterizing the first page of a PDF for image-only engines.
//!
//! We use Poppler's `pdftocairo` CLI tool, which handles damaged PDFs far
//! more gracefully than most libraries.

use clap::Args;
use tokio::{fs, process::Command};

use crate::{exec::check_for_command_failure, prelude::*};

/// Options for PDF rasterization.
#[derive(Args, Clone, Debug)]
pub struct RasterOpts {
    /// The resolution, in DPI, used when rasterizing PDF pages.
    #[clap(long, default_value = "200")]
    pub raster_dpi: u32,
}

impl Default for RasterOpts {
    fn default() -> Self {
        Self { raster_dpi: 200 }
    }
}

/// Convert the first page of a PDF to PNG bytes.
///
/// Fails with a descriptive error when the input isn't parseable as a PDF or
/// has no pages.
#[instrument(level = "debug", skip_all, fields(dpi = opts.raster_dpi))]
pub async fn pdf_first_page_to_png(pdf_bytes: &[u8], opts: &RasterOpts) -> Result<Vec<u8>> {
    let tmpdir = tempfile::TempDir::with_prefix("ocr-bench-raster")
        .context("cannot create rasterization scratch directory")?;
    let input_path = tmpdir.path().join("input.pdf");
    fs::write(&input_path, pdf_bytes)
        .await
        .context("cannot write rasterization input file")?;

    let output = Command::new("pdftocairo")
        .arg("-png")
        .args(["-f", "1", "-l", "1"])
        .args(["-r", &opts.raster_dpi.to_string()])
        .arg(&input_path)
        .arg(tmpdir.path().join("page"))
        .output()
        .await
        .context("cannot run pdftocairo (is poppler-utils installed?)")?;
    check_for_command_failure("pdftocairo", &output)?;

    // pdftocairo numbers its outputs, with zero-padding that depends on the
    // total page count.
    for candidate in ["page-1.png", "page-01.png", "page-001.png"] {
        let path = tmpdir.path().join(candidate);
        if path.exists() {
            return fs::read(&path)
                .await
                .context("cannot read rasterized page");
        }
    }
    Err(anyhow!(
        "pdftocairo produced no output page; the PDF may have zero pages"
    ))
}
