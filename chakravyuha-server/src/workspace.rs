//! Workspace management
//!
//! Each job owns exactly one directory tree under the scratch root:
//! - `{root}/{job_id}/{source_file}`: the submitted source
//! - `{root}/{job_id}/build/`: binary, report and visualization output
//!
//! The job id is the only namespace key, so concurrent jobs never need to
//! coordinate. Removal is best-effort and idempotent: cleanup problems are
//! logged and never hide the outcome of the job that triggered them.

use chakravyuha_core::domain::artifact::BUILD_DIR;
use chakravyuha_core::domain::job::JobId;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Workspace errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to initialize scratch root {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Workspace for job {0} already exists")]
    Collision(JobId),

    #[error("Failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle to one job's directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    job_id: JobId,
    root: PathBuf,
}

impl Workspace {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Top-level directory of the workspace
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the primary tool writes its output into
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    /// Path of a file inside the build directory
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.build_dir().join(name)
    }
}

/// A directory found under the scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Allocates and reclaims job workspaces under one scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Prepares the scratch root and returns a manager for it
    ///
    /// Anything left in the root by a previous process is discarded. This is
    /// the only crash recovery there is: unfinished jobs are never replayed.
    pub async fn init(root: PathBuf) -> Result<Self, WorkspaceError> {
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => info!("Discarded previous scratch root {}", root.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(WorkspaceError::Init { path: root, source }),
        }

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| WorkspaceError::Init {
                path: root.clone(),
                source,
            })?;

        info!("Scratch root ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for a job's workspace, whether or not it exists on disk
    pub fn workspace(&self, job_id: JobId) -> Workspace {
        Workspace {
            job_id,
            root: self.root.join(job_id.to_string()),
        }
    }

    /// Creates the directory tree for a new job
    ///
    /// The job directory is created non-recursively so that an id collision
    /// is reported instead of silently sharing a tree.
    pub async fn create(&self, job_id: JobId) -> Result<Workspace, WorkspaceError> {
        let workspace = self.workspace(job_id);

        match tokio::fs::create_dir(workspace.root()).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision(job_id));
            }
            Err(source) => {
                return Err(WorkspaceError::Create {
                    path: workspace.root().to_path_buf(),
                    source,
                });
            }
        }

        if let Err(source) = tokio::fs::create_dir(workspace.build_dir()).await {
            self.destroy(&workspace).await;
            return Err(WorkspaceError::Create {
                path: workspace.build_dir(),
                source,
            });
        }

        debug!(job_id = %job_id, "Workspace created at {}", workspace.root().display());
        Ok(workspace)
    }

    /// Writes the submitted source into the workspace
    ///
    /// The file is synced before returning so the external tool never sees a
    /// partially written source.
    pub async fn write_source_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = workspace.root().join(file_name);
        let write_err = |source| WorkspaceError::Write {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        file.write_all(content.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        debug!(
            job_id = %workspace.job_id(),
            bytes = content.len(),
            "Source written to {}",
            path.display()
        );
        Ok(path)
    }

    /// Removes a workspace and everything in it
    ///
    /// Never fails: a missing tree is already the desired state, any other
    /// error is logged.
    pub async fn destroy(&self, workspace: &Workspace) {
        match tokio::fs::remove_dir_all(workspace.root()).await {
            Ok(()) => debug!(job_id = %workspace.job_id(), "Workspace destroyed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(job_id = %workspace.job_id(), "Workspace already gone");
            }
            Err(e) => warn!(
                job_id = %workspace.job_id(),
                error = %e,
                "Failed to destroy workspace {}",
                workspace.root().display()
            ),
        }
    }

    /// Lists every directory currently under the scratch root
    pub async fn entries(&self) -> io::Result<Vec<WorkspaceEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            if metadata.is_dir() {
                entries.push(WorkspaceEntry {
                    path: entry.path(),
                    modified: metadata.modified()?,
                });
            }
        }

        Ok(entries)
    }
}

/// Removes a workspace when dropped unless released first
///
/// Held by a job while it runs and by a download while it streams, so that a
/// dropped request future (client disconnect) or a finished transfer always
/// reclaims the tree.
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: Workspace,
    armed: bool,
}

impl WorkspaceGuard {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            armed: true,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Hands the workspace back without removing it
    pub fn release(mut self) -> Workspace {
        self.armed = false;
        self.workspace.clone()
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let job_id = self.workspace.job_id();
        let root = self.workspace.root().to_path_buf();

        // Keep recursive deletes off the async worker threads
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_on_drop(job_id, &root));
            }
            Err(_) => remove_on_drop(job_id, &root),
        }
    }
}

fn remove_on_drop(job_id: JobId, root: &Path) {
    match std::fs::remove_dir_all(root) {
        Ok(()) => debug!(job_id = %job_id, "Workspace reclaimed on drop"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job_id,
            error = %e,
            "Failed to reclaim workspace on drop"
        ),
    }
}

/// Waits for a guard's background removal to land
#[cfg(test)]
pub(crate) async fn wait_for_removal(path: &Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    !path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn manager() -> (TempDir, WorkspaceManager) {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::init(tmp.path().join("sessions"))
            .await
            .unwrap();
        (tmp, manager)
    }

    #[tokio::test]
    async fn test_init_discards_leftovers() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("sessions");
        std::fs::create_dir_all(root.join("stale/build")).unwrap();
        std::fs::write(root.join("stale/build/report.json"), "{}").unwrap();

        let manager = WorkspaceManager::init(root.clone()).await.unwrap();

        assert!(root.exists());
        assert!(!root.join("stale").exists());
        assert!(manager.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_builds_tree() {
        let (_tmp, manager) = manager().await;
        let job_id = JobId::new();

        let ws = manager.create(job_id).await.unwrap();

        assert_eq!(ws.root(), manager.root().join(job_id.to_string()));
        assert!(ws.build_dir().is_dir());
        assert_eq!(ws.artifact("report.json"), ws.build_dir().join("report.json"));
    }

    #[tokio::test]
    async fn test_create_reports_collision() {
        let (_tmp, manager) = manager().await;
        let job_id = JobId::new();

        manager.create(job_id).await.unwrap();
        let err = manager.create(job_id).await.unwrap_err();

        assert!(matches!(err, WorkspaceError::Collision(id) if id == job_id));
    }

    #[tokio::test]
    async fn test_create_fails_without_root() {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::init(tmp.path().join("sessions"))
            .await
            .unwrap();
        std::fs::remove_dir_all(manager.root()).unwrap();

        let err = manager.create(JobId::new()).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Create { .. }));
    }

    #[tokio::test]
    async fn test_write_source_file_verbatim() {
        let (_tmp, manager) = manager().await;
        let ws = manager.create(JobId::new()).await.unwrap();
        let source = "#include <stdio.h>\nint main() { puts(\"hi\"); }\n";

        let path = manager.write_source_file(&ws, "main.c", source).await.unwrap();

        assert_eq!(path, ws.root().join("main.c"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), source);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (_tmp, manager) = manager().await;
        let ws = manager.create(JobId::new()).await.unwrap();
        std::fs::write(ws.artifact("obfuscated_program"), b"\x7fELF").unwrap();

        manager.destroy(&ws).await;
        assert!(!ws.root().exists());

        manager.destroy(&ws).await;
        manager.destroy(&manager.workspace(JobId::new())).await;
    }

    #[tokio::test]
    async fn test_entries_lists_workspaces() {
        let (_tmp, manager) = manager().await;
        manager.create(JobId::new()).await.unwrap();
        manager.create(JobId::new()).await.unwrap();
        std::fs::write(manager.root().join("not-a-dir"), "x").unwrap();

        assert_eq!(manager.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_guard_removes_on_drop() {
        let (_tmp, manager) = manager().await;
        let ws = manager.create(JobId::new()).await.unwrap();

        drop(WorkspaceGuard::new(ws.clone()));

        assert!(wait_for_removal(ws.root()).await);
    }

    #[test]
    fn test_guard_removes_inline_without_runtime() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace {
            job_id: JobId::new(),
            root: tmp.path().join("job"),
        };
        std::fs::create_dir_all(ws.build_dir()).unwrap();

        drop(WorkspaceGuard::new(ws.clone()));

        assert!(!ws.root().exists());
    }

    #[tokio::test]
    async fn test_guard_release_keeps_workspace() {
        let (_tmp, manager) = manager().await;
        let ws = manager.create(JobId::new()).await.unwrap();

        let kept = WorkspaceGuard::new(ws.clone()).release();

        assert_eq!(kept, ws);
        assert!(ws.root().exists());
    }
}
