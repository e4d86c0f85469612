//! Raw checkpoint content retrieval.

use crate::error::{LedgerError, Result};
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Fetches the raw text behind a checkpoint's `git_raw_url`.
pub trait ContentFetcher {
    /// # Errors
    ///
    /// Returns [`LedgerError::ContentFetch`] if the content cannot be
    /// retrieved.
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Unauthenticated HTTP GET with a timeout.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ledger-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl ContentFetcher for HttpContentFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |reason: String| LedgerError::ContentFetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| fetch_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )));
        }
        let content = response.text().map_err(|err| fetch_error(err.to_string()))?;
        debug!(url, bytes = content.len(), "Fetched checkpoint content");
        Ok(content)
    }
}

/// Serves content from a fixed URL map. Unknown URLs fail.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    pages: HashMap<String, String>,
}

impl StaticContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, url: &str, content: &str) -> Self {
        self.pages.insert(url.to_string(), content.to_string());
        self
    }
}

impl ContentFetcher for StaticContent {
    fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| LedgerError::ContentFetch {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}
