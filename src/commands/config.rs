use anyhow::Result;
use colored::Colorize;
use log_metrics_exporter::config;
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Prints the effective configuration, after defaults and `LOG_EXPORTER__*`
/// environment overrides are applied
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Apps: {}", cfg.apps.len());
    println!(
        "  Source Files: {}",
        cfg.apps.iter().map(|a| a.source_files.len()).sum::<usize>()
    );
    println!(
        "  Relabel Rules: {}",
        cfg.apps.iter().map(|a| a.relabel.len()).sum::<usize>()
    );

    Ok(())
}
