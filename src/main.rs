use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::prelude::*;

mod billing;
mod cmd;
mod data_url;
mod dispatch;
mod engines;
mod exec;
mod normalize;
mod prelude;
mod raster;
mod record;
mod registry;
mod retry;

/// Benchmark OCR engines against a document.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - GEMINI_API_KEY: API key for the `gemini` engine.
  - MISTRAL_OCR_ENDPOINT, MISTRAL_OCR_TOKEN: For the `mistral` engine.
  - AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, AZURE_OPENAI_DEPLOYMENT:
    For the `gpt` engine.
  - OLLAMA_URL (optional): Base URL for the `glm-ocr` engine.
  - CPU_PER_HOUR_USD, <ENGINE>_USD_PER_INPUT_TOKEN,
    <ENGINE>_USD_PER_OUTPUT_TOKEN (optional): Billing rates.

  These variables may be set in a standard `.env` file.

The `tesseract` engine needs the `tesseract` CLI tool installed, and PDF
inputs need poppler's `pdftocairo`.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run one OCR engine against a document.
    Run(cmd::run::RunOpts),
    /// Run every registered engine against a document.
    Bench(cmd::bench::BenchOpts),
    /// List registered engines.
    List(cmd::list::ListOpts),
    /// Print the JSON Schema of the output record.
    Schema(cmd::schema::SchemaOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("warn").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Run(opts) => cmd::run::cmd_run(opts).await,
        Cmd::Bench(opts) => cmd::bench::cmd_bench(opts).await,
        Cmd::List(opts) => cmd::list::cmd_list(opts).await,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await,
    }
}
