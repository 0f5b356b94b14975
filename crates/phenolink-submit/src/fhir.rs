//! HTTP client for the remote FHIR-style repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use phenolink_core::defaults;
use phenolink_core::{
    CanonicalResource, Error, ResourceRepository, Result, TokenProvider, UpsertResponse,
};

/// Remote repository connection settings.
#[derive(Debug, Clone)]
pub struct FhirConfig {
    /// Base URL of the repository, e.g. `https://fhir.example.org/r4`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl FhirConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: defaults::SUBMIT_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables; requires `PHENOLINK_FHIR_BASE`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PHENOLINK_FHIR_BASE")
            .map_err(|_| Error::Config("PHENOLINK_FHIR_BASE not set".to_string()))?;
        Ok(Self::new(base_url))
    }
}

/// Repository client performing PUT-by-logical-id upserts.
///
/// The resource's client-assigned identifier is the logical id, so retried
/// submissions update in place instead of creating duplicates.
pub struct FhirRepository {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl FhirRepository {
    pub fn new(config: FhirConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }
}

#[async_trait]
impl ResourceRepository for FhirRepository {
    async fn upsert(&self, resource: &CanonicalResource) -> Result<UpsertResponse> {
        let token = self.tokens.bearer_token().await?;

        let url = format!(
            "{}/{}/{}",
            self.base_url, resource.resource_type, resource.resource_id
        );
        debug!(resource_id = %resource.resource_id, url = %url, "Upserting resource");

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(resource)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.ok().filter(|b| !b.is_empty());
        Ok(UpsertResponse { status, body })
    }
}
