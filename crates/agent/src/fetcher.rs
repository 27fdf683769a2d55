//! Long-poll config fetcher.
//!
//! Issues `GET /api/config?client_id=<id>[&version=<v>]` against the
//! control plane. When the agent passes its current version the server
//! holds the request until something changes or its hold ceiling expires;
//! an empty 200 means "nothing changed, reconnect".

use std::time::Duration;

use aegis_core::ClientConfig;

/// Outer deadline for one fetch, comfortably above the server's 55 s hold.
const FETCH_TIMEOUT: Duration = Duration::from_secs(90);

/// Error type for config fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-200 status.
    #[error("config endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// The response body was not a valid config document.
    #[error("failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetches the client config from the control plane.
pub struct ConfigFetcher {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl ConfigFetcher {
    /// Create a fetcher with a pre-configured HTTP client.
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Long-poll the config endpoint.
    ///
    /// `known_version` empty means "first call, respond immediately".
    /// Returns `Ok(None)` when the server closed the poll with no change.
    pub async fn fetch(&self, known_version: &str) -> Result<Option<ClientConfig>, FetchError> {
        let url = format!("{}/api/config", self.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .get(&url)
            .query(&[("client_id", self.client_id.as_str())]);
        if !known_version.is_empty() {
            request = request.query(&[("version", known_version)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            // Long-poll timeout with no version change.
            return Ok(None);
        }

        let config: ClientConfig = serde_json::from_slice(&body)?;
        Ok(Some(config))
    }
}
