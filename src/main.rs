//! Shipwright - cross-platform release pipelines
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use shipwright::cli::args::LogFormat;
use shipwright::cli::{commands, Cli, Commands};
use shipwright::config::{Config, ConfigManager};
use shipwright::error::ShipwrightResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, format: LogFormat) {
    // 0 = warn (spinner only), 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("shipwright=warn"),
        1 => EnvFilter::new("shipwright=info"),
        _ => EnvFilter::new("shipwright=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_target(false).without_time().init(),
    }
}

fn log_format(cli: &Cli, config: &Config) -> LogFormat {
    cli.log_format.unwrap_or(match config.general.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    })
}

async fn run() -> ShipwrightResult<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Completions(args) = cli.command {
        commands::completions(args);
        return Ok(ExitCode::SUCCESS);
    }

    let manager = match &cli.pipeline {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    init_logging(cli.verbose, log_format(&cli, &config));
    shipwright::ui::init_theme();
    debug!("Pipeline file: {}", manager.path().display());

    match cli.command {
        Commands::Run(args) => commands::run(args, &manager, &config).await,
        Commands::Plan(args) => commands::plan(args, &manager, &config)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Cache(args) => commands::cache(args, &manager, &config)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Config(args) => commands::config(args, &manager, &config)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Completions(_) => Ok(ExitCode::SUCCESS),
    }
}
