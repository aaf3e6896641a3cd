//! Health DTOs

use serde::{Deserialize, Serialize};

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Workspaces currently on disk (running jobs plus pending downloads)
    pub workspaces: usize,
}
