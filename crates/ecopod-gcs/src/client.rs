//! GCS upload client
//!
//! Thin typed wrapper over the GCS JSON API's media upload endpoint. Files
//! on a pod are already compressed audio of bounded size, so the simple
//! single-request upload is sufficient; there is no resumable-session
//! handling here.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use ecopod_core::domain::newtypes::ObjectKey;
use ecopod_core::ports::remote_store::IRemoteStore;

use crate::auth::{ServiceAccountKey, TokenManager};

/// Base URL for the GCS JSON API
const GCS_BASE_URL: &str = "https://storage.googleapis.com";

// ============================================================================
// T163: GcsClient
// ============================================================================

/// HTTP client for object uploads to one bucket
pub struct GcsClient {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    tokens: TokenManager,
}

impl GcsClient {
    /// Creates a client for `bucket` authenticated as `key`.
    pub fn new(bucket: impl Into<String>, key: ServiceAccountKey) -> Self {
        Self::with_base_url(bucket, key, GCS_BASE_URL)
    }

    /// Creates a client with a custom API base URL (useful for testing).
    pub fn with_base_url(
        bucket: impl Into<String>,
        key: ServiceAccountKey,
        base_url: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::new();
        Self {
            tokens: TokenManager::new(key, http.clone()),
            http,
            base_url: base_url.into(),
            bucket: bucket.into(),
        }
    }

    /// The destination bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

// ============================================================================
// T164: IRemoteStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IRemoteStore for GcsClient {
    /// Uploads `local_path` as object `key`.
    ///
    /// Success means the store acknowledged the object with a 2xx; only
    /// then may the caller delete the local file.
    async fn upload(&self, local_path: &Path, key: &ObjectKey) -> Result<()> {
        let data = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let size = data.len();

        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url, self.bucket
        );

        debug!(key = %key, size, "Uploading object");
        let response = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .with_context(|| format!("Upload request failed for {key}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Upload of {key} rejected with {status}: {body}");
        }

        info!(key = %key, size, bucket = %self.bucket, "Object uploaded");
        Ok(())
    }
}
