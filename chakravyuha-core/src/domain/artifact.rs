//! Workspace artifact layout
//!
//! File names and relative paths the external toolchain writes to, and the
//! public URLs through which they are exposed.

use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;

/// Subdirectory of a workspace the primary tool writes into
pub const BUILD_DIR: &str = "build";
/// Obfuscated binary produced by the primary tool
pub const BINARY_ARTIFACT: &str = "obfuscated_program";
/// Required JSON report produced by the primary tool
pub const REPORT_ARTIFACT: &str = "report.json";
/// Optional JSON size metrics produced by the primary tool
pub const SIZE_METRICS_ARTIFACT: &str = "size_metrics.json";
/// Visualization output, relative to the build directory
pub const VISUALIZATION_DIR: &str = "visualizations";
/// Comparison page, relative to the visualization directory
pub const COMPARISON_PAGE: &str = "comparison/index.html";

/// Download URL path for a job's binary
pub fn download_path(job_id: &JobId) -> String {
    format!("/download/{}/{}", job_id, BINARY_ARTIFACT)
}

/// Job a download URL path points at
pub fn job_id_from_download_path(path: &str) -> Option<JobId> {
    let id = path.strip_prefix("/download/")?.split('/').next()?;
    JobId::parse(id)
}

/// URL path of a job's comparison page
///
/// Images referenced by the page resolve relative to it, under the same
/// `/sessions/{job_id}/visualizations/` prefix.
pub fn comparison_page_path(job_id: &JobId) -> String {
    format!(
        "/sessions/{}/{}/{}",
        job_id, VISUALIZATION_DIR, COMPARISON_PAGE
    )
}

/// Contents of `size_metrics.json`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeMetrics {
    /// Size of the unobfuscated build in bytes
    pub original_size: f64,
    /// Size of the obfuscated build in bytes
    pub obfuscated_size: f64,
}
