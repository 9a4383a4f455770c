//! Flotilla CLI - deployment orchestration simulator
//!
//! Runs a scenario file through the deployment manager against an
//! in-memory provider:
//! - account selection by priority and quota
//! - sequential launch with optional partial launch
//! - provider state reports driving the deployment state machine
//! - rollback and destroy

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod output;
mod scenario;
mod simulate;

use config::CliConfig;
use output::OutputFormat;
use scenario::Scenario;

/// Flotilla CLI application
#[derive(Parser)]
#[command(name = "flotilla")]
#[command(about = "Flotilla - multi-instance deployment orchestration simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLOTILLA_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "FLOTILLA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FLOTILLA_LOG_JSON")]
    json: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Launch a scenario's manifest and replay its provider reports
    Simulate {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Force partial launch on or off
        #[arg(long)]
        partial_launch: Option<bool>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Simulate {
            scenario,
            partial_launch,
        } => {
            let mut scenario = Scenario::load(&scenario)?;
            if partial_launch.is_some() {
                scenario.partial_launch = partial_launch;
            }

            tracing::info!(
                user = %scenario.user,
                assemblies = scenario.manifest.assemblies.len(),
                accounts = scenario.accounts.len(),
                "Running scenario"
            );

            let report = simulate::run(scenario, config.orchestrator).await?;
            output::print_report(&report, cli.output)?;
        }
        Commands::Config => {
            output::print_json(&config)?;
        }
    }

    Ok(())
}
