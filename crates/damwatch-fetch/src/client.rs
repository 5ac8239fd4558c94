//! Async HTTP client for the WaterInsights resources API.

use std::{fmt, future::Future, time::Duration};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{Result, auth, error::TransportError};

/// Connection settings and credentials for the upstream API.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url:     String,
  pub timeout_secs: u64,
  pub api_key:      Option<String>,
  /// Bearer token. When absent, one is requested with `api_key` and
  /// `api_secret` before the first fetch.
  pub access_token: Option<String>,
  pub api_secret:   Option<String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.onegov.nsw.gov.au".to_owned(),
      timeout_secs: 30,
      api_key:      None,
      access_token: None,
      api_secret:   None,
    }
  }
}

impl fmt::Debug for ApiConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
    f.debug_struct("ApiConfig")
      .field("base_url", &self.base_url)
      .field("timeout_secs", &self.timeout_secs)
      .field("api_key", &redact(&self.api_key))
      .field("access_token", &redact(&self.access_token))
      .field("api_secret", &redact(&self.api_secret))
      .finish()
  }
}

impl ApiConfig {
  /// Names of the credential settings that are missing for a fetch run.
  pub fn missing_credentials(&self) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if self.api_key.as_deref().is_none_or(str::is_empty) {
      missing.push("api.api_key");
    }
    if self.access_token.as_deref().is_none_or(str::is_empty)
      && self.api_secret.as_deref().is_none_or(str::is_empty)
    {
      missing.push("api.access_token (or api.api_secret)");
    }
    missing
  }
}

/// Status and body of one upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
  pub status: StatusCode,
  pub body:   String,
}

/// Source of per-dam `resources/latest` answers.
///
/// [`WaterInsightsClient`] is the production implementation; the
/// [`Fetcher`](crate::Fetcher) depends only on this trait.
pub trait ResourceApi: Send + Sync {
  fn latest_resources<'a>(
    &'a self,
    dam_id: &'a str,
  ) -> impl Future<Output = Result<UpstreamResponse, TransportError>> + Send + 'a;
}

/// Authenticated client for the WaterInsights API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct WaterInsightsClient {
  client:       Client,
  base_url:     String,
  api_key:      String,
  access_token: String,
}

impl WaterInsightsClient {
  /// Build the HTTP client and resolve credentials, requesting an access
  /// token if none is configured.
  pub async fn connect(config: &ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    let api_key = config.api_key.clone().unwrap_or_default();
    let access_token = match config.access_token.as_deref().filter(|t| !t.is_empty()) {
      Some(token) => token.to_owned(),
      None => {
        let secret = config.api_secret.as_deref().unwrap_or_default();
        auth::request_access_token(&client, &config.base_url, &api_key, secret).await?
      }
    };

    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      api_key,
      access_token,
    })
  }

  fn url(&self, dam_id: &str) -> String {
    format!(
      "{}/waternsw-waterinsights/v1/dams/{dam_id}/resources/latest",
      self.base_url
    )
  }
}

impl ResourceApi for WaterInsightsClient {
  async fn latest_resources(&self, dam_id: &str) -> Result<UpstreamResponse, TransportError> {
    let resp = self
      .client
      .get(self.url(dam_id))
      .bearer_auth(&self.access_token)
      .header("apikey", &self.api_key)
      .send()
      .await?;

    let status = resp.status();
    let body = resp.text().await?;
    debug!(dam_id, %status, bytes = body.len(), "upstream answered");
    Ok(UpstreamResponse { status, body })
  }
}
