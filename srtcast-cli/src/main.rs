//! srtcast CLI
//!
//! Push a desktop window or screen to an SRT ingest endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Check that ffmpeg is installed and speaks SRT
//! srtcast info
//!
//! # Stream the primary display to a saved server
//! srtcast cast --server local --quality high
//!
//! # Stop it from another terminal
//! srtcast stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// srtcast - push a window or screen to an SRT endpoint
#[derive(Parser)]
#[command(name = "srtcast")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Push a desktop window or screen to an SRT ingest endpoint", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture sources
    #[command(alias = "ls")]
    ListSources,

    /// Start streaming to an SRT endpoint
    Cast(commands::CastArgs),

    /// Stop the running cast
    Stop,

    /// Show status of the running cast
    Status(commands::StatusArgs),

    /// Show the detected ffmpeg and its SRT support
    Info(commands::InfoArgs),

    /// Print the transport URL for an endpoint
    Resolve(commands::ResolveArgs),

    /// Push a short test pattern to an endpoint
    TestEndpoint(commands::TestEndpointArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// List quality presets and saved profiles
    Presets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("srtcast={}", level).parse()?)
                .add_directive(format!("srtcast_core={}", level).parse()?),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.clone();

    // Run the appropriate command
    match cli.command {
        Commands::ListSources => commands::list_sources(config_path.as_deref()).await?,
        Commands::Cast(args) => commands::cast(args, config_path.as_deref()).await?,
        Commands::Stop => commands::stop().await?,
        Commands::Status(args) => commands::status(args).await?,
        Commands::Info(args) => commands::info(args, config_path.as_deref()).await?,
        Commands::Resolve(args) => commands::resolve(args, config_path.as_deref()).await?,
        Commands::TestEndpoint(args) => commands::test_endpoint(args, config_path.as_deref()).await?,
        Commands::Config(args) => commands::config(args, config_path).await?,
        Commands::Presets => commands::presets(config_path.as_deref()).await?,
    }

    Ok(())
}
