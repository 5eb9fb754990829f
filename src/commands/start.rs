use anyhow::Result;
use colored::Colorize;
use log_metrics_exporter::{config, init_tracing, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
///
/// This will:
/// 1. Load configuration
/// 2. Initialize logging with the configured level and format
/// 3. Start the collectors and the scrape endpoint
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting exporter...".green());

    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    info!(
        config = %config_path.display(),
        apps = cfg.apps.len(),
        "Starting log metrics exporter"
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
