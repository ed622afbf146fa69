use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod server;

use config::Config;
use server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_file.as_deref())?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facematchd starting");

    config.validate()?;
    config.validate_model_dir()?;

    tracing::info!(
        model_dir = %config.model_dir.display(),
        workers = config.workers,
        intra_threads = config.intra_threads,
        score_threshold = config.score_threshold,
        embed_timeout_secs = config.embed_timeout_secs,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config.model_dir, config.workers, config.intra_threads)
        .context("failed to start face embedding engine")?;

    tracing::info!("facematchd ready");

    Server::new(config, engine)?.serve().await?;
    Ok(())
}

/// Log to stderr, or append to `log_file` without ANSI colours when set.
/// `RUST_LOG` overrides the default `info` level.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
