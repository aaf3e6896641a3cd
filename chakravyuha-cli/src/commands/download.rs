//! Download command handler

use anyhow::{Context, Result, bail};
use chakravyuha_core::domain::job::JobId;
use colored::*;
use std::path::Path;

use crate::config::Config;

/// Download a job's binary by id
pub async fn handle_download(job_id: &str, output: &Path, config: &Config) -> Result<()> {
    let Some(id) = JobId::parse(job_id) else {
        bail!("'{}' is not a valid job ID", job_id);
    };

    let bytes = config
        .client()
        .download_job(&id, output)
        .await
        .with_context(|| format!("Failed to download job {}", id))?;

    mark_executable(output).await?;

    println!(
        "{} {} ({} bytes)",
        "Downloaded".green().bold(),
        output.display(),
        bytes
    );

    Ok(())
}

/// Downloaded programs are meant to be run
pub async fn mark_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = tokio::fs::metadata(path).await?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        tokio::fs::set_permissions(path, permissions)
            .await
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
