//! Client-credentials access token acquisition.

use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::{Error, Result};

#[derive(Deserialize)]
struct TokenResponse {
  access_token: Option<String>,
}

/// `GET {base_url}/oauth/client_credential/accesstoken?grant_type=client_credentials`
/// with HTTP Basic `api_key:api_secret`.
pub async fn request_access_token(
  client: &Client,
  base_url: &str,
  api_key: &str,
  api_secret: &str,
) -> Result<String> {
  let url = format!(
    "{}/oauth/client_credential/accesstoken",
    base_url.trim_end_matches('/')
  );

  let resp = client
    .get(url)
    .basic_auth(api_key, Some(api_secret))
    .query(&[("grant_type", "client_credentials")])
    .send()
    .await?;

  let status = resp.status();
  if !status.is_success() {
    return Err(Error::Auth(format!("token endpoint answered {status}")));
  }

  let token: TokenResponse = resp.json().await?;
  let token = token
    .access_token
    .filter(|t| !t.is_empty())
    .ok_or_else(|| Error::Auth("token response carried no access_token".into()))?;

  info!("obtained upstream access token");
  Ok(token)
}
