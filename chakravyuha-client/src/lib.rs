//! Chakravyuha HTTP Client
//!
//! A simple, type-safe HTTP client for the Chakravyuha obfuscation service.
//!
//! # Example
//!
//! ```no_run
//! use chakravyuha_client::ObfuscatorClient;
//! use chakravyuha_core::dto::obfuscate::ObfuscateRequest;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ObfuscatorClient::new("http://localhost:3001");
//!
//!     let response = client.obfuscate(&ObfuscateRequest {
//!         code: Some("int main() { return 0; }".to_string()),
//!         ..Default::default()
//!     }).await?;
//!
//!     let bytes = client
//!         .download(&response.download_path, Path::new("obfuscated_program"))
//!         .await?;
//!     println!("Downloaded {} bytes", bytes);
//!     Ok(())
//! }
//! ```

pub mod error;
mod obfuscate;

// Re-export commonly used types
pub use chakravyuha_core::dto::health::HealthResponse;
pub use chakravyuha_core::dto::obfuscate::{ObfuscateRequest, ObfuscateResponse};
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Chakravyuha service API
#[derive(Debug, Clone)]
pub struct ObfuscatorClient {
    /// Base URL of the service (e.g., "http://localhost:3001")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ObfuscatorClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use chakravyuha_client::ObfuscatorClient;
    ///
    /// let client = ObfuscatorClient::new("http://localhost:3001");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// Jobs are answered only once they finish, so callers submitting large
    /// sources may want a generous request timeout here.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path returned by the service
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fails on error statuses, decoding the service's error body
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_response_body(status.as_u16(), &body));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ObfuscatorClient::new("http://localhost:3001");
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ObfuscatorClient::new("http://localhost:3001/");
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = ObfuscatorClient::with_client("http://obfuscator:3001", http_client);
        assert_eq!(client.base_url(), "http://obfuscator:3001");
    }

    #[test]
    fn test_url_for_service_paths() {
        let client = ObfuscatorClient::new("http://localhost:3001/");
        assert_eq!(
            client.url_for("/download/abc/obfuscated_program"),
            "http://localhost:3001/download/abc/obfuscated_program"
        );
        assert_eq!(client.url_for("health"), "http://localhost:3001/health");
    }
}
