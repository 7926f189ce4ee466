//! HTTP implementation of [`PageFetcher`].

use std::time::Duration;

use hansard_shared::{HansardError, PageFetcher, Result};
use reqwest::Client;
use tracing::debug;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("hansard/", env!("CARGO_PKG_VERSION"));

/// Fetches pages over HTTP with a fixed page-load timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HansardError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HansardError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| transport_error(url, e))
    }
}

/// Timeouts are kept distinct so callers can fall back to side-channel copies.
fn transport_error(url: &str, e: reqwest::Error) -> HansardError {
    if e.is_timeout() {
        HansardError::Timeout(url.to_string())
    } else {
        HansardError::Network(format!("{url}: {e}"))
    }
}
