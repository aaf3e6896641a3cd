//! Report aggregation
//!
//! Merges the JSON artifacts written by the primary tool with the request
//! parameters into the single report returned to the caller. The artifact
//! schemas belong to the external tool; only presence and parseability are
//! checked here.

use chakravyuha_core::domain::artifact::{REPORT_ARTIFACT, SIZE_METRICS_ARTIFACT, SizeMetrics};
use chakravyuha_core::domain::job::JobSpec;
use serde_json::{Map, Value as JsonValue, json};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::workspace::Workspace;

/// Aggregation errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// The tool exited successfully but did not write its report
    #[error("Report {} was not produced", .path.display())]
    Missing { path: PathBuf },

    /// An artifact exists but does not honor its format
    #[error("Malformed artifact {}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        reason: String,
        /// File contents as read, for diagnostics
        raw: String,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Builds the final report for a job whose tools all succeeded
pub async fn aggregate(workspace: &Workspace, spec: &JobSpec) -> Result<JsonValue, ReportError> {
    let report_path = workspace.artifact(REPORT_ARTIFACT);
    let raw = read_optional(&report_path)
        .await?
        .ok_or_else(|| ReportError::Missing {
            path: report_path.clone(),
        })?;

    let mut report: JsonValue =
        serde_json::from_str(&raw).map_err(|e| ReportError::Corrupt {
            path: report_path.clone(),
            reason: e.to_string(),
            raw: raw.clone(),
        })?;

    let Some(fields) = report.as_object_mut() else {
        return Err(ReportError::Corrupt {
            path: report_path,
            reason: "report is not a JSON object".to_string(),
            raw,
        });
    };

    // The tool is not required to echo inputs it did not use
    object_field(fields, "inputParameters")
        .insert("obfuscationLevel".to_string(), json!(spec.level));
    object_field(fields, "obfuscationMetrics")
        .insert("cyclesCompleted".to_string(), json!(spec.cycles));

    let metrics_path = workspace.artifact(SIZE_METRICS_ARTIFACT);
    if let Some(raw_metrics) = read_optional(&metrics_path).await? {
        let metrics: SizeMetrics =
            serde_json::from_str(&raw_metrics).map_err(|e| ReportError::Corrupt {
                path: metrics_path.clone(),
                reason: e.to_string(),
                raw: raw_metrics.clone(),
            })?;

        let attributes = object_field(fields, "outputAttributes");
        for (key, value) in size_attributes(&metrics) {
            attributes.insert(key, value);
        }

        debug!(
            job_id = %workspace.job_id(),
            original = metrics.original_size,
            obfuscated = metrics.obfuscated_size,
            "Size metrics merged"
        );
    }

    Ok(report)
}

/// Relative size change as a two-decimal percentage
///
/// An empty original yields `0.00%` rather than a division by zero.
pub fn size_change(original: f64, obfuscated: f64) -> String {
    if original == 0.0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", (obfuscated - original) / original * 100.0)
}

/// Human-readable size with binary prefixes, e.g. `1.5 KB`
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0.0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut scaled = bytes;
    while scaled >= 1024.0 && exponent < UNITS.len() - 1 {
        scaled /= 1024.0;
        exponent += 1;
    }
    let rounded = (scaled * 100.0).round() / 100.0;

    format!("{} {}", rounded, UNITS[exponent])
}

fn size_attributes(metrics: &SizeMetrics) -> Vec<(String, JsonValue)> {
    vec![
        (
            "originalSize".to_string(),
            json!(format_bytes(metrics.original_size)),
        ),
        (
            "obfuscatedSize".to_string(),
            json!(format_bytes(metrics.obfuscated_size)),
        ),
        (
            "sizeChange".to_string(),
            json!(size_change(metrics.original_size, metrics.obfuscated_size)),
        ),
        ("originalSizeBytes".to_string(), json!(metrics.original_size)),
        (
            "obfuscatedSizeBytes".to_string(),
            json!(metrics.obfuscated_size),
        ),
    ]
}

/// Returns the object stored under `key`, replacing absent or non-object values
fn object_field<'a>(fields: &'a mut Map<String, JsonValue>, key: &str) -> &'a mut Map<String, JsonValue> {
    let entry = fields
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Object(Map::new()));

    if !entry.is_object() {
        *entry = JsonValue::Object(Map::new());
    }

    match entry {
        JsonValue::Object(map) => map,
        _ => unreachable!("entry was just replaced by an object"),
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, ReportError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ReportError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceManager;
    use chakravyuha_core::domain::job::JobId;
    use tempfile::TempDir;

    fn spec(level: &str, cycles: u32) -> JobSpec {
        JobSpec {
            source_text: "int main() {}".to_string(),
            source_file_name: "source.cpp".to_string(),
            pipeline_spec: String::new(),
            cycles,
            level: level.to_string(),
            generate_visualization: false,
        }
    }

    async fn workspace() -> (TempDir, Workspace) {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::init(tmp.path().join("sessions"))
            .await
            .unwrap();
        let ws = manager.create(JobId::new()).await.unwrap();
        (tmp, ws)
    }

    #[tokio::test]
    async fn test_injects_request_parameters() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(
            ws.artifact(REPORT_ARTIFACT),
            r#"{"inputParameters":{}, "obfuscationMetrics":{}}"#,
        )
        .unwrap();

        let report = aggregate(&ws, &spec("high", 3)).await.unwrap();

        assert_eq!(report["inputParameters"]["obfuscationLevel"], "high");
        assert_eq!(report["obfuscationMetrics"]["cyclesCompleted"], 3);
        assert!(report.get("outputAttributes").is_none());
    }

    #[tokio::test]
    async fn test_keeps_tool_fields_and_creates_missing_sections() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(
            ws.artifact(REPORT_ARTIFACT),
            r#"{"inputParameters":"n/a","passes":["flatten","strings"],"obfuscationMetrics":{"stringsEncrypted":7}}"#,
        )
        .unwrap();

        let report = aggregate(&ws, &spec("medium", 1)).await.unwrap();

        assert_eq!(report["passes"], json!(["flatten", "strings"]));
        assert_eq!(report["inputParameters"], json!({"obfuscationLevel": "medium"}));
        assert_eq!(report["obfuscationMetrics"]["stringsEncrypted"], 7);
        assert_eq!(report["obfuscationMetrics"]["cyclesCompleted"], 1);
    }

    #[tokio::test]
    async fn test_missing_report() {
        let (_tmp, ws) = workspace().await;

        let err = aggregate(&ws, &spec("low", 1)).await.unwrap_err();

        assert!(matches!(err, ReportError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_unparseable_report_keeps_raw_text() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(ws.artifact(REPORT_ARTIFACT), "{ not json").unwrap();

        match aggregate(&ws, &spec("low", 1)).await.unwrap_err() {
            ReportError::Corrupt { raw, .. } => assert_eq!(raw, "{ not json"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_object_report_is_corrupt() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(ws.artifact(REPORT_ARTIFACT), "[1, 2, 3]").unwrap();

        let err = aggregate(&ws, &spec("low", 1)).await.unwrap_err();

        assert!(matches!(err, ReportError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_merges_size_metrics() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(ws.artifact(REPORT_ARTIFACT), "{}").unwrap();
        std::fs::write(
            ws.artifact(SIZE_METRICS_ARTIFACT),
            r#"{"originalSize": 1000, "obfuscatedSize": 1500}"#,
        )
        .unwrap();

        let report = aggregate(&ws, &spec("high", 2)).await.unwrap();
        let attributes = &report["outputAttributes"];

        assert_eq!(attributes["sizeChange"], "50.00%");
        assert_eq!(attributes["originalSize"], "1000 Bytes");
        assert_eq!(attributes["obfuscatedSize"], "1.46 KB");
        assert_eq!(attributes["originalSizeBytes"], 1000.0);
        assert_eq!(attributes["obfuscatedSizeBytes"], 1500.0);
    }

    #[tokio::test]
    async fn test_zero_original_size() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(ws.artifact(REPORT_ARTIFACT), "{}").unwrap();
        std::fs::write(
            ws.artifact(SIZE_METRICS_ARTIFACT),
            r#"{"originalSize": 0, "obfuscatedSize": 512}"#,
        )
        .unwrap();

        let report = aggregate(&ws, &spec("high", 2)).await.unwrap();

        assert_eq!(report["outputAttributes"]["sizeChange"], "0.00%");
        assert_eq!(report["outputAttributes"]["originalSize"], "0 Bytes");
    }

    #[tokio::test]
    async fn test_malformed_size_metrics_is_corrupt() {
        let (_tmp, ws) = workspace().await;
        std::fs::write(ws.artifact(REPORT_ARTIFACT), "{}").unwrap();
        std::fs::write(ws.artifact(SIZE_METRICS_ARTIFACT), r#"{"originalSize": "big"}"#).unwrap();

        let err = aggregate(&ws, &spec("high", 2)).await.unwrap_err();

        match err {
            ReportError::Corrupt { path, .. } => {
                assert!(path.ends_with(SIZE_METRICS_ARTIFACT))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_size_change() {
        assert_eq!(size_change(1000.0, 1500.0), "50.00%");
        assert_eq!(size_change(1000.0, 800.0), "-20.00%");
        assert_eq!(size_change(3.0, 4.0), "33.33%");
        assert_eq!(size_change(0.0, 1500.0), "0.00%");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0 Bytes");
        assert_eq!(format_bytes(512.0), "512 Bytes");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(1_048_576.0), "1 MB");
        assert_eq!(format_bytes(1_500_000.0), "1.43 MB");
        assert_eq!(format_bytes(5.0 * 1024f64.powi(5)), "5120 TB");
    }
}
