//! Configuration module
//!
//! Handles CLI configuration such as the service URL.

use chakravyuha_client::ObfuscatorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the obfuscation service
    pub server_url: String,
}

impl Config {
    /// Client for the configured service
    pub fn client(&self) -> ObfuscatorClient {
        ObfuscatorClient::new(&self.server_url)
    }
}
