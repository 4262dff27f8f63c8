//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::ForgeError;

/// JSON client for third-party APIs authenticated with bearer keys
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str) -> Result<Self, ForgeError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ForgeError::ConfigError(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ForgeError::ConfigError(format!(
                "Invalid base URL '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ForgeError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| ForgeError::Internal(format!("Invalid request path '{}': {}", path, e)))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, ForgeError> {
        let url = self.url(path)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;

        Self::parse(response, "GET").await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, ForgeError> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .json(body)
            .send()
            .await?;

        Self::parse(response, "POST").await
    }

    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
        method: &str,
    ) -> Result<T, ForgeError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            return Err(ForgeError::Upstream(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            HttpClient::new("not a url"),
            Err(ForgeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_joins_paths_without_double_slash() {
        let client = HttpClient::new("https://api.tailscale.com/").unwrap();
        let url = client.url("/api/v2/tailnet/-/keys?all=true").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.tailscale.com/api/v2/tailnet/-/keys?all=true"
        );
    }
}
