//! Sham Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sham_server::{compile, ShamConfig};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "sham-server",
    about = "Reads a JSON or YAML config file and spins up a local HTTP server that serves fake API endpoints",
    version
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info", global = true)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the routes described in a config file
    Mock {
        /// Path to configuration file
        config: PathBuf,

        /// Override the port from the config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check a config file and print its routes without serving
    Validate {
        /// Path to configuration file
        config: PathBuf,
    },
}

fn load(path: &Path) -> Result<ShamConfig> {
    info!(path = %path.display(), "Loading configuration");
    ShamConfig::from_file(path)
        .with_context(|| format!("Failed to read config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Mock { config, port } => {
            let config = load(&config)?;
            let port = config.effective_port(port);
            let server = compile(config).context("Invalid configuration")?;
            server.listen(port).await?;
        }
        Command::Validate { config } => {
            let config = load(&config)?;
            let server = compile(config).context("Invalid configuration")?;
            println!(
                "Configuration is valid ({} routes defined)",
                server.routes().len()
            );
            for route in server.routes() {
                println!("  {:<7} {}", route.method.as_str(), route.path);
            }
        }
    }

    Ok(())
}
