// src/enrichment.rs
//! Client for the third-party LinkedIn profile scraping API.

use crate::crypto::{ApiKeyCipher, DecryptionError};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error(transparent)]
    Decryption(#[from] DecryptionError),
    #[error("enrichment request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Raw response of one profile lookup. Non-200 statuses are returned as-is,
/// never retried; the caller decides how to record them.
#[derive(Debug, Clone)]
pub struct ProfileResponse {
    pub status: u16,
    pub body: String,
}

impl ProfileResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Human-readable error text from a failed lookup body.
pub fn error_description(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("description").and_then(|d| d.as_str().map(String::from)))
        .unwrap_or_else(|| "No description provided".to_string())
}

/// Collaborator seam for the enrichment API, so the ingestion pipeline can be
/// exercised without network access.
pub trait ProfileFetcher {
    fn fetch(
        &self,
        linkedin_url: &str,
        encrypted_api_key: &str,
    ) -> impl std::future::Future<Output = Result<ProfileResponse, EnrichmentError>> + Send;

    fn download_picture(
        &self,
        picture_url: &str,
        folder: &Path,
        public_identifier: &str,
    ) -> impl std::future::Future<Output = Result<PathBuf>> + Send;
}

pub struct EnrichmentClient {
    client: reqwest::Client,
    endpoint: String,
    cipher: ApiKeyCipher,
}

impl EnrichmentClient {
    pub fn new(endpoint: String, cipher: ApiKeyCipher, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            cipher,
        })
    }
}

impl ProfileFetcher for EnrichmentClient {
    /// One synchronous lookup: decrypt the stored key, pass it as a bearer
    /// credential with the target URL as a query parameter.
    async fn fetch(
        &self,
        linkedin_url: &str,
        encrypted_api_key: &str,
    ) -> Result<ProfileResponse, EnrichmentError> {
        let api_key = self.cipher.decrypt(encrypted_api_key)?;

        info!("Fetching profile: {}", linkedin_url);

        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(api_key)
            .query(&[("url", linkedin_url)])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ProfileResponse { status, body })
    }

    /// Save the profile picture as `<public_identifier>.png` in the configured
    /// folder.
    async fn download_picture(
        &self,
        picture_url: &str,
        folder: &Path,
        public_identifier: &str,
    ) -> Result<PathBuf> {
        let response = self
            .client
            .get(picture_url)
            .send()
            .await
            .context("Failed to fetch profile picture")?;

        if !response.status().is_success() {
            anyhow::bail!("Picture download returned HTTP {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read picture bytes")?;

        tokio::fs::create_dir_all(folder)
            .await
            .with_context(|| format!("Failed to create picture folder: {}", folder.display()))?;

        let path = folder.join(format!("{}.png", public_identifier));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write picture: {}", path.display()))?;

        Ok(path)
    }
}

/// Format one failed lookup for the API error list.
pub fn format_api_error(status: u16, body: &str, linkedin_url: &str) -> String {
    let description = error_description(body);
    if description == "No description provided" {
        warn!("Lookup for {} failed with status {} and no description", linkedin_url, status);
    }
    format!(
        "API call failed with status code: {} - {} For profile: {}",
        status, description, linkedin_url
    )
}
