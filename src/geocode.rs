// src/geocode.rs
//! Geocoding collaborator. Resolves a city name or country ISO code to a
//! "[lat,lng]" string for the lookup tables.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Collaborator seam so lookup-table rebuilds can run against a stub in tests.
pub trait CoordinateLookup {
    fn lookup(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

pub struct GeocodingClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeocodingClient {
    pub fn new(base_url: String, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }
}

impl CoordinateLookup for GeocodingClient {
    /// First hit of a Nominatim-style search. A miss is not an error; the
    /// caller just leaves that location out of the lookup table.
    async fn lookup(&self, query: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .with_context(|| format!("Geocoding request failed for: {}", query))?;

        if !response.status().is_success() {
            warn!("Geocoding for '{}' returned HTTP {}", query, response.status());
            return Ok(None);
        }

        let hits: Vec<GeocodeHit> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse geocoding response for: {}", query))?;

        Ok(hits
            .into_iter()
            .next()
            .map(|hit| format!("[{},{}]", hit.lat, hit.lon)))
    }
}
