//! Health command handler

use anyhow::{Context, Result};
use colored::*;

use crate::config::Config;

/// Print the service status
pub async fn handle_health(config: &Config) -> Result<()> {
    let health = config
        .client()
        .health()
        .await
        .with_context(|| format!("Service at {} is unreachable", config.server_url))?;

    let status = if health.status == "ok" {
        health.status.green()
    } else {
        health.status.red()
    };

    println!("{}", "Service Health:".bold());
    println!("  URL:        {}", config.server_url.cyan());
    println!("  Status:     {}", status);
    println!("  Workspaces: {}", health.workspaces);

    Ok(())
}
