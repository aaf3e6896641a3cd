//! Chakravyuha CLI
//!
//! Command-line interface for the Chakravyuha obfuscation service.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "chakravyuha")]
#[command(about = "Chakravyuha obfuscation service CLI", long_about = None)]
struct Cli {
    /// Service URL
    #[arg(
        long,
        env = "CHAKRAVYUHA_SERVER_URL",
        default_value = "http://localhost:3001"
    )]
    server_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server_url,
    };

    handle_command(cli.command, &config).await
}
