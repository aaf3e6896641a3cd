//! Artifact Service
//!
//! Hands completed job output back to callers: the one-shot binary download
//! and read-only access to the visualization pages.

use chakravyuha_core::domain::artifact::VISUALIZATION_DIR;
use chakravyuha_core::domain::job::JobId;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info};

use crate::workspace::{WorkspaceGuard, WorkspaceManager};

/// Service error type
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Unknown job, unknown file, already downloaded or malformed request
    #[error("File not found or session expired")]
    NotFound,

    #[error("Failed to read artifact: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// An artifact taken exclusively by one download
///
/// Dropping it (transfer finished or client gone) destroys the whole
/// workspace through the guard.
#[derive(Debug)]
pub struct ClaimedArtifact {
    pub name: String,
    pub size: u64,
    pub file: File,
    pub guard: WorkspaceGuard,
}

/// Claims a build artifact for download
///
/// The artifact is renamed out of the build directory before it is opened.
/// Rename is atomic, so of two concurrent downloads exactly one claims the
/// file and the other sees [`ArtifactError::NotFound`].
pub async fn claim(workspaces: &WorkspaceManager, job_id: &str, name: &str) -> Result<ClaimedArtifact> {
    let job_id = JobId::parse(job_id).ok_or(ArtifactError::NotFound)?;
    if !is_artifact_name(name) {
        return Err(ArtifactError::NotFound);
    }

    let workspace = workspaces.workspace(job_id);
    let path = workspace.artifact(name);

    match tokio::fs::symlink_metadata(&path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(ArtifactError::NotFound),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ArtifactError::NotFound),
        Err(e) => return Err(e.into()),
    }

    let claimed = workspace.root().join(format!(".claimed-{}", name));
    match tokio::fs::rename(&path, &claimed).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(job_id = %job_id, "Artifact {} already claimed", name);
            return Err(ArtifactError::NotFound);
        }
        Err(e) => return Err(e.into()),
    }

    // From here on the workspace belongs to this download
    let guard = WorkspaceGuard::new(workspace);
    let file = File::open(&claimed).await?;
    let size = file.metadata().await?.len();

    info!(job_id = %job_id, artifact = name, size, "Artifact claimed for download");

    Ok(ClaimedArtifact {
        name: name.to_string(),
        size,
        file,
        guard,
    })
}

/// Reads one file of a job's visualization output
///
/// `relative_path` must stay inside the visualization directory; anything
/// else is reported as not found.
pub async fn read_visualization(
    workspaces: &WorkspaceManager,
    job_id: &str,
    relative_path: &str,
) -> Result<(Vec<u8>, &'static str)> {
    let job_id = JobId::parse(job_id).ok_or(ArtifactError::NotFound)?;
    let relative = confined_path(relative_path).ok_or(ArtifactError::NotFound)?;

    let path = workspaces
        .workspace(job_id)
        .build_dir()
        .join(VISUALIZATION_DIR)
        .join(&relative);

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((bytes, content_type(&relative))),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory) => {
            Err(ArtifactError::NotFound)
        }
        Err(e) => Err(e.into()),
    }
}

/// Build artifact names are flat, conservative file names
fn is_artifact_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Accepts only plain relative components: no root, no `..`, no `.`
fn confined_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() || raw.contains(['\\', '\0']) {
        return None;
    }

    let mut path = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => path.push(part),
            _ => return None,
        }
    }

    (!path.as_os_str().is_empty()).then_some(path)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("dot") | Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chakravyuha_core::domain::artifact::BINARY_ARTIFACT;
    use crate::workspace::wait_for_removal;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn manager_with_job() -> (TempDir, WorkspaceManager, JobId) {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::init(tmp.path().join("sessions"))
            .await
            .unwrap();
        let job_id = JobId::new();
        let ws = manager.create(job_id).await.unwrap();
        std::fs::write(ws.artifact(BINARY_ARTIFACT), b"\x7fELF-binary").unwrap();
        (tmp, manager, job_id)
    }

    #[tokio::test]
    async fn test_claim_is_single_use() {
        let (_tmp, manager, job_id) = manager_with_job().await;
        let id = job_id.to_string();

        let mut claimed = claim(&manager, &id, BINARY_ARTIFACT).await.unwrap();
        let mut bytes = Vec::new();
        claimed.file.read_to_end(&mut bytes).await.unwrap();

        assert_eq!(bytes, b"\x7fELF-binary");
        assert_eq!(claimed.size, 11);
        assert!(matches!(
            claim(&manager, &id, BINARY_ARTIFACT).await,
            Err(ArtifactError::NotFound)
        ));

        drop(claimed);
        assert!(wait_for_removal(manager.workspace(job_id).root()).await);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (_tmp, manager, job_id) = manager_with_job().await;
        let id = job_id.to_string();

        let (a, b) = tokio::join!(
            claim(&manager, &id, BINARY_ARTIFACT),
            claim(&manager, &id, BINARY_ARTIFACT),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_claim_rejects_bad_requests() {
        let (_tmp, manager, job_id) = manager_with_job().await;
        let id = job_id.to_string();

        for (job, name) in [
            ("not-a-job", BINARY_ARTIFACT),
            (id.as_str(), "missing"),
            (id.as_str(), "..%2Freport.json"),
            (id.as_str(), ".claimed-obfuscated_program"),
            (id.as_str(), ""),
        ] {
            assert!(
                matches!(claim(&manager, job, name).await, Err(ArtifactError::NotFound)),
                "{} {}",
                job,
                name
            );
        }

        // Nothing was claimed, the workspace is untouched
        assert!(manager.workspace(job_id).artifact(BINARY_ARTIFACT).exists());
    }

    #[tokio::test]
    async fn test_read_visualization() {
        let (_tmp, manager, job_id) = manager_with_job().await;
        let dir = manager
            .workspace(job_id)
            .build_dir()
            .join(VISUALIZATION_DIR)
            .join("comparison");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<html>cmp</html>").unwrap();
        let id = job_id.to_string();

        let (bytes, mime) = read_visualization(&manager, &id, "comparison/index.html")
            .await
            .unwrap();
        assert_eq!(bytes, b"<html>cmp</html>");
        assert_eq!(mime, "text/html; charset=utf-8");

        for path in ["../obfuscated_program", "/etc/passwd", "comparison/../../x", "comparison", ""] {
            assert!(
                matches!(
                    read_visualization(&manager, &id, path).await,
                    Err(ArtifactError::NotFound)
                ),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("cfg/main.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
