use async_trait::async_trait;
use reqwest::{Client, Identity};
use url::Url;

use crate::api::{FetchResponse, IssueFetcher};
use crate::config::settings::TransportConfig;
use crate::errors::{CommsError, Result};

/// Shared HTTP session for the Jira API.
///
/// Build one at startup and pass it by reference; the underlying client pools
/// connections and holds the client certificate. Rebuild only if the
/// certificate rotates.
pub struct JiraClient {
    client: Client,
}

impl JiraClient {
    pub fn new(transport: &TransportConfig) -> Result<Self> {
        // Identity::from_pem yields a rustls identity, so the backend must match.
        let mut builder = Client::builder()
            .use_rustls_tls()
            .user_agent(transport.user_agent.clone());

        if let Some(cert_path) = &transport.cert_path {
            let pem = std::fs::read(cert_path).map_err(|e| {
                CommsError::ConfigInvalid(format!(
                    "Failed to read client certificate {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
            let identity = Identity::from_pem(&pem).map_err(|e| {
                CommsError::ConfigInvalid(format!(
                    "Invalid client certificate {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| CommsError::ConfigInvalid(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl IssueFetcher for JiraClient {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CommsError::transport(format!("Failed to send request to Jira: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CommsError::Transport {
                status: Some(status.as_u16()),
                message: format!("GET {} returned {}: {}", url, status, text),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CommsError::transport(format!("Failed to read Jira response: {}", e)))?;

        Ok(FetchResponse {
            status: status.as_u16(),
            body,
        })
    }
}
