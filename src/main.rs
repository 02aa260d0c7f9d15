//! gale: advertising report connectors for BigQuery.
//!
//! Serves per-platform `/load` endpoints that pull reporting data from
//! vendor APIs (DV360 via its asynchronous report lifecycle; Google Ads,
//! TikTok, and LinkedIn synchronously) and load it into BigQuery.

mod config;
mod connectors;
mod dates;
mod error;
mod frame;
mod google;
mod http;
mod metrics;
mod report;
mod secrets;
mod storage;
mod vendor;
mod warehouse;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::ConfigError;

/// Advertising report connector service.
#[derive(Parser, Debug)]
#[command(name = "gale")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without serving.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("gale starting");

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Bind address: {}", config.server.address);
        info!("Metrics enabled: {}", config.metrics.enabled);
        for (platform, defaults) in &config.connectors {
            info!("  {} defaults: {} keys", platform, defaults.len());
        }
        info!("Configuration is valid");
        return Ok(());
    }

    http::serve(config).await
}
