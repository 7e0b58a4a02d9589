//! Camlink CLI: run and inspect the multi-channel camera ingest core.
//!
//! Usage:
//!   camlink serve [--bind ADDR]          Serve the control API
//!   camlink check                        Check the transcoder, capture dir, and relay ports
//!   camlink args <PROFILE> <SOURCE>      Print a profile's transcoder command line
//!   camlink channels                     Show the configured channel table
//!   camlink init-config [--force]        Write the default config file

use std::path::{Path, PathBuf};

use anyhow::Context;
use camlink_common::config::AppConfig;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "camlink",
    about = "Multi-channel camera relay, capture, upload, and forwarding",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    Relay,
    Capture,
    Forward,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the control API until Ctrl+C
    Serve {
        /// Control API bind address (overrides the config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check that the host can run every channel
    Check,

    /// Print the transcoder command line of a profile
    Args {
        /// Which profile to build
        #[arg(value_enum)]
        profile: ProfileArg,

        /// Source URL
        source: String,

        /// Capture: frame directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Capture: frames per second (transcoder default when omitted)
        #[arg(long)]
        fps: Option<u32>,

        /// Forward: ingest host
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Forward: ingest port
        #[arg(long, default_value = "9000")]
        port: u16,
    },

    /// Show the configured channel table
    Channels,

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(AppConfig::load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = cli.command {
        return commands::init::run(cli.config, force);
    }

    let mut config = load_config(cli.config.as_deref())?;

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    camlink_common::logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Serve { bind } => commands::serve::run(config, bind).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Args {
            profile,
            source,
            dir,
            fps,
            host,
            port,
        } => commands::args::run(&config, profile, &source, &dir, fps, &host, port),
        Commands::Channels => commands::channels::run(&config),
        Commands::InitConfig { .. } => unreachable!("handled before loading config"),
    }
}
