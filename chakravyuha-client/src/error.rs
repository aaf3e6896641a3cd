//! Error types for the Chakravyuha client

use chakravyuha_core::dto::obfuscate::ErrorResponse;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Chakravyuha client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The service answered with an error status
    #[error("{category} (status {status}): {details}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error category reported by the service, e.g. `ExecutionError`
        category: String,
        /// Details reported by the service, including tool output
        details: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Writing a downloaded artifact failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Builds an API error from a status code and the raw response body
    ///
    /// Bodies that are not the service's JSON error shape (e.g. from a proxy)
    /// are kept verbatim as the details.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) => Self::Api {
                status,
                category: err.error,
                details: err.details,
            },
            Err(_) => Self::Api {
                status,
                category: "HttpError".to_string(),
                details: body.to_string(),
            },
        }
    }

    /// Error category reported by the service, if any
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Api { category, .. } => Some(category),
            _ => None,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}
