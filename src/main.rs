mod ai;
mod bucket;
mod capture;
mod config;
mod error;
mod materialize;
mod ocr;
mod pipeline;
mod video;

use std::path::PathBuf;

use anyhow::bail;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::ocr::OcrBackend;

const DEFAULT_LOG_FILTER: &str = "shotlapse=info";

#[derive(Parser)]
#[command(name = "shotlapse")]
#[command(about = "Bundle timestamped screenshots into timelapse videos", long_about = None)]
struct Cli {
    /// TOML config file (default: <config dir>/shotlapse/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Archive root holding the capture and output directories
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Bucket length in seconds
    #[arg(short = 'l', long)]
    bucket_length: Option<u64>,
    /// Minimum capture age in seconds
    #[arg(long)]
    min_age: Option<u64>,
    /// Only encode windows that have fully aged
    #[arg(long)]
    wait_for_full_window: bool,
    /// Write OCR sidecars for new captures before encoding
    #[arg(long)]
    ocr: bool,
    /// Print the bucket partition and exit without encoding
    #[arg(short, long)]
    diagnose: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(bucket_length) = self.bucket_length {
            config.bucket_length = bucket_length;
        }
        if let Some(min_age) = self.min_age {
            config.min_age = min_age;
        }
        config.wait_for_full_window |= self.wait_for_full_window;
        config.ocr.enabled |= self.ocr;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let now = Utc::now().timestamp();

    if cli.diagnose {
        for row in pipeline::plan(&config, now)? {
            println!("{}", row);
        }
        return Ok(());
    }

    let renditions = pipeline::ffmpeg_renditions(&config);
    let ocr = config
        .ocr
        .enabled
        .then(|| OcrBackend::from_config(&config.ocr));
    let summary = pipeline::run(&config, &renditions, ocr.as_ref(), now).await?;

    if let Some(first) = summary.failed.first() {
        bail!(
            "{} artifacts failed across {} buckets; first: bucket {} ({}): {}",
            summary.failed.len(),
            summary.buckets,
            first.key,
            first.rendition,
            first.error
        );
    }
    Ok(())
}
