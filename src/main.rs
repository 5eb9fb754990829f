use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use log_metrics_exporter::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    // The start command initializes tracing itself, once the configured
    // level and format are known
    let command = args.get_command();
    if !matches!(command, cli::Commands::Start) {
        init_tracing("warn", "text");
    }

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(&args.config).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Log Metrics Exporter v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
