//! Service API endpoints

use crate::ObfuscatorClient;
use crate::error::Result;
use chakravyuha_core::domain::artifact::download_path;
use chakravyuha_core::domain::job::JobId;
use chakravyuha_core::dto::health::HealthResponse;
use chakravyuha_core::dto::obfuscate::{ObfuscateRequest, ObfuscateResponse};
use std::path::Path;
use tokio::io::AsyncWriteExt;

impl ObfuscatorClient {
    // =============================================================================
    // Jobs
    // =============================================================================

    /// Submit source code and wait for the job to finish
    ///
    /// # Returns
    /// The merged report and the one-shot download path of the binary
    pub async fn obfuscate(&self, req: &ObfuscateRequest) -> Result<ObfuscateResponse> {
        let url = self.url_for("/obfuscate");
        tracing::debug!("Submitting job to {}", url);
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Download an artifact into `dest`
    ///
    /// A download consumes the job on the server: a second call for the same
    /// path fails with a 404.
    ///
    /// # Returns
    /// The number of bytes written
    pub async fn download(&self, download_path: &str, dest: &Path) -> Result<u64> {
        let url = self.url_for(download_path);
        let response = self.client.get(&url).send().await?;
        let mut response = self.check_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!("Downloaded {} bytes from {} to {}", written, url, dest.display());
        Ok(written)
    }

    /// Download the binary of a job by id
    pub async fn download_job(&self, job_id: &JobId, dest: &Path) -> Result<u64> {
        self.download(&download_path(job_id), dest).await
    }

    /// Fetch a visualization page as text
    pub async fn comparison_page(&self, path: &str) -> Result<String> {
        let url = self.url_for(path);
        let response = self.client.get(&url).send().await?;

        Ok(self.check_status(response).await?.text().await?)
    }

    // =============================================================================
    // Service
    // =============================================================================

    /// Check service health
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url_for("/health");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
