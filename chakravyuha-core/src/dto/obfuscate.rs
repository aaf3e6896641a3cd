//! Obfuscation DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Body of `POST /obfuscate`
///
/// Every field is optional on the wire so that missing or mistyped values
/// surface as validation errors from the service rather than as
/// deserialization rejections. `cycles` accepts a number or a numeric string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_cfg: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Successful response of `POST /obfuscate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscateResponse {
    pub success: bool,
    /// Merged report produced by the toolchain
    pub report: JsonValue,
    /// One-shot download URL path for the obfuscated binary
    pub download_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_page_path: Option<String>,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable category, e.g. `ExecutionError`
    pub error: String,
    /// Human-readable details, including captured tool output when available
    #[serde(default)]
    pub details: String,
}
