use async_trait::async_trait;
use url::Url;

use crate::errors::Result;

pub mod jira;

pub use jira::JiraClient;

/// Raw outcome of a successful round trip; the status is always 2xx.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Read-only access to issue records.
///
/// Implementations return `CommsError::Transport` when the request cannot
/// complete or the tracker answers with a non-success status.
#[async_trait]
pub trait IssueFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse>;
}
