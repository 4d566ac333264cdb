use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unfurl_client::convert::convert_tree;
use unfurl_client::listener::LogListener;
use unfurl_common::config::ConvertConfig;

#[derive(Parser)]
#[command(
    name = "unfurl-convert",
    about = "Convert files, mail messages, and archives to cached plain text"
)]
struct Args {
    /// File or directory to convert
    input: PathBuf,

    /// Root of a separate output tree (default: store beside each source)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path prefix to strip when mirroring sources under --output
    #[arg(long)]
    strip_prefix: Option<String>,

    /// Rewrite existing cache entries
    #[arg(long)]
    overwrite: bool,

    /// Keep markup in standalone HTML files instead of scrubbing it
    #[arg(long)]
    keep_markup: bool,

    /// Container nesting bound
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,unfurl_convert=info,unfurl_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut cfg = ConvertConfig {
        output_root: args.output,
        strip_prefix: args.strip_prefix,
        overwrite: args.overwrite,
        scrub_html: !args.keep_markup,
        ..Default::default()
    };
    if let Some(depth) = args.max_depth {
        cfg.max_depth = depth;
    }

    let input = args
        .input
        .canonicalize()
        .with_context(|| format!("reading input {}", args.input.display()))?;

    let mut listener = LogListener::default();
    convert_tree(&input, &cfg, &mut listener)?;

    tracing::info!(
        "done: {} converted, {} without text, {} failed, {} children",
        listener.converted,
        listener.unconverted,
        listener.failed,
        listener.children
    );
    Ok(())
}
