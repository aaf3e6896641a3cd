//! Workspace sweeper
//!
//! Completed jobs keep their workspace until the binary is downloaded. Clients
//! that never download would otherwise leak a directory per job, so old
//! workspaces are removed on a fixed interval.

use std::io;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::workspace::WorkspaceManager;

/// Periodically removes workspaces older than a maximum age
pub struct WorkspaceSweeper {
    workspaces: WorkspaceManager,
    interval: Duration,
    max_age: Duration,
}

impl WorkspaceSweeper {
    pub fn new(workspaces: WorkspaceManager, interval: Duration, max_age: Duration) -> Self {
        Self {
            workspaces,
            interval,
            max_age,
        }
    }

    /// Starts the sweep loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!(
            "Starting workspace sweeper on {} (interval: {:?}, max age: {:?})",
            self.workspaces.root().display(),
            self.interval,
            self.max_age
        );

        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.sweep_once(SystemTime::now()).await {
                Ok(0) => debug!("No expired workspaces"),
                Ok(removed) => info!("Reclaimed {} expired workspace(s)", removed),
                Err(e) => error!("Error during sweep cycle: {}", e),
            }
        }
    }

    /// Removes every workspace last modified more than `max_age` before `now`
    ///
    /// Returns how many were removed. A workspace that disappears mid-sweep
    /// (downloaded in the meantime) is not an error.
    pub async fn sweep_once(&self, now: SystemTime) -> io::Result<usize> {
        let mut removed = 0;

        for entry in self.workspaces.entries().await? {
            // Timestamps from the future count as fresh
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            match tokio::fs::remove_dir_all(&entry.path).await {
                Ok(()) => {
                    debug!("Removed expired workspace {} (age {:?})", entry.path.display(), age);
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove expired workspace {}: {}", entry.path.display(), e),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chakravyuha_core::domain::job::JobId;
    use tempfile::TempDir;

    async fn sweeper() -> (TempDir, WorkspaceManager, WorkspaceSweeper) {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::init(tmp.path().join("sessions"))
            .await
            .unwrap();
        let sweeper = WorkspaceSweeper::new(
            manager.clone(),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        (tmp, manager, sweeper)
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_workspaces() {
        let (_tmp, manager, sweeper) = sweeper().await;
        let ws = manager.create(JobId::new()).await.unwrap();

        let removed = sweeper.sweep_once(SystemTime::now()).await.unwrap();

        assert_eq!(removed, 0);
        assert!(ws.root().exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_workspaces() {
        let (_tmp, manager, sweeper) = sweeper().await;
        let first = manager.create(JobId::new()).await.unwrap();
        let second = manager.create(JobId::new()).await.unwrap();
        std::fs::write(second.artifact("obfuscated_program"), b"bin").unwrap();

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        let removed = sweeper.sweep_once(later).await.unwrap();

        assert_eq!(removed, 2);
        assert!(!first.root().exists());
        assert!(!second.root().exists());
        assert!(manager.root().exists());
    }

    #[tokio::test]
    async fn test_sweep_fails_without_root() {
        let (_tmp, manager, sweeper) = sweeper().await;
        std::fs::remove_dir_all(manager.root()).unwrap();

        assert!(sweeper.sweep_once(SystemTime::now()).await.is_err());
    }
}
