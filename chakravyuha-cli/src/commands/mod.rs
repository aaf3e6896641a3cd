//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod download;
mod health;
mod obfuscate;

pub use obfuscate::ObfuscateArgs;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Obfuscate a source file and download the resulting binary (see --no-download)
    Obfuscate(ObfuscateArgs),
    /// Download the binary of a completed job
    Download {
        /// Job ID printed by `obfuscate --no-download`
        job_id: String,

        /// Where to write the binary
        #[arg(short, long, default_value = "obfuscated_program")]
        output: PathBuf,
    },
    /// Check service health
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Obfuscate(args) => obfuscate::handle_obfuscate(args, config).await,
        Commands::Download { job_id, output } => {
            download::handle_download(&job_id, &output, config).await
        }
        Commands::Health => health::handle_health(config).await,
    }
}
