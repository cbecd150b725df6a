//! ALDL Logger - Main Entry Point
//!
//! Usage: `aldl-logger [config.toml]`

use aldl_logger::{init_logging, run, LoggerConfig};
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = LoggerConfig::load(path.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_level)?;

    info!("=== ALDL Logger v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &path {
        info!("Configuration loaded from {}", path.display());
    }

    run(config).await.context("Logger failed")?;
    Ok(())
}
