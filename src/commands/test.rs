use anyhow::Result;
use colored::Colorize;
use log_metrics_exporter::{config, watcher::FileWatcher};
use std::path::Path;
use tracing::info;

/// Execute the test command
///
/// Loads and validates the configuration, then checks that every source
/// file can be opened. Fails when no source at all is readable, which is
/// the condition that would stop `start`.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Testing configuration...".yellow());
    info!("Loading and validating configuration");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration test successful".green());
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}:{}", "Server".cyan(), cfg.server.host, cfg.server.port);
    println!("  {}: {}", "Metrics Endpoint".cyan(), cfg.metrics.endpoint);
    println!("  {}: {}", "Log Level".cyan(), cfg.server.log_level);
    println!("  {}: {}", "Log Format".cyan(), cfg.server.log_format);
    println!();

    let mut readable = 0;
    println!("  {}: {}", "Apps".cyan(), cfg.apps.len());
    for app in &cfg.apps {
        println!(
            "    {} ({} external labels, {} relabel rules)",
            app.name.bold(),
            app.external_labels.len(),
            app.relabel.len()
        );
        for path in &app.source_files {
            match FileWatcher::open(path).await {
                Ok(_) => {
                    readable += 1;
                    println!("      {} {}", "✓".green(), path.display());
                }
                Err(e) => println!("      {} {}", "✗".red(), e),
            }
        }
    }
    println!();

    if readable == 0 {
        anyhow::bail!("No source file can be opened");
    }

    info!(readable, "Configuration test completed");
    Ok(())
}
