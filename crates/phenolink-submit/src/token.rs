//! OAuth2 client-credentials token acquisition and caching.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use phenolink_core::defaults;
use phenolink_core::{Error, Result, TokenProvider};

/// Identity provider connection settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Optional scope parameter.
    pub scope: Option<String>,
    /// Token request timeout in seconds.
    pub timeout_secs: u64,
}

impl OAuthConfig {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
            timeout_secs: defaults::TOKEN_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    ///
    /// Requires `PHENOLINK_TOKEN_URL`, `PHENOLINK_CLIENT_ID`, and
    /// `PHENOLINK_CLIENT_SECRET`; `PHENOLINK_TOKEN_SCOPE` is optional.
    pub fn from_env() -> Result<Self> {
        let token_url = std::env::var("PHENOLINK_TOKEN_URL")
            .map_err(|_| Error::Config("PHENOLINK_TOKEN_URL not set".to_string()))?;
        let client_id = std::env::var("PHENOLINK_CLIENT_ID")
            .map_err(|_| Error::Config("PHENOLINK_CLIENT_ID not set".to_string()))?;
        let client_secret = std::env::var("PHENOLINK_CLIENT_SECRET")
            .map_err(|_| Error::Config("PHENOLINK_CLIENT_SECRET not set".to_string()))?;

        Ok(Self {
            token_url,
            client_id,
            client_secret,
            scope: std::env::var("PHENOLINK_TOKEN_SCOPE").ok(),
            timeout_secs: defaults::TOKEN_TIMEOUT_SECS,
        })
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Caching client-credentials token provider.
///
/// The cached token is refreshed proactively within a leeway window before
/// expiry. The cache lock is held across the refresh request, so only one
/// refresh is ever in flight; concurrent submitters wait on it and reuse
/// the fresh token.
pub struct OAuthTokenProvider {
    client: reqwest::Client,
    config: OAuthConfig,
    cache: Mutex<Option<CachedToken>>,
    refresh_leeway: Duration,
}

impl OAuthTokenProvider {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            cache: Mutex::new(None),
            refresh_leeway: Duration::from_secs(defaults::TOKEN_REFRESH_LEEWAY_SECS),
        })
    }

    /// Override the proactive-refresh leeway.
    pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.refresh_leeway = leeway;
        self
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(scope) = &self.config.scope {
            params.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("identity provider unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Authentication(format!("malformed token response: {}", e)))?;

        let lifetime = token
            .expires_in
            .unwrap_or(defaults::TOKEN_DEFAULT_LIFETIME_SECS);
        debug!(expires_in = lifetime, "Acquired access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() + self.refresh_leeway {
                return Ok(cached.access_token.clone());
            }
            info!("Access token near expiry, refreshing");
        }

        let fresh = self.fetch().await?;
        let token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
