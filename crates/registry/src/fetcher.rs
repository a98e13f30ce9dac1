//! HTTP fetching of token-list documents.

use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, warn};

use shared::{Error, Result};

use crate::document::{parse_token_list, TokenListDocument};

/// Outcome of fetching one list URI.
///
/// Failures stay attached to the URI they came from so one broken list
/// never hides the others.
#[derive(Debug)]
pub struct ListOutcome {
    pub uri: String,
    pub result: Result<TokenListDocument>,
}

/// Downloads and parses token-list documents.
pub struct ListFetcher {
    client: Client,
}

impl ListFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetch and parse a single token-list document.
    pub async fn fetch(&self, uri: &str) -> Result<TokenListDocument> {
        debug!("Fetching token list from {}", uri);

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to fetch token list {}: {}", uri, e)))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "Token list {} returned status: {}",
                uri,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read token list {}: {}", uri, e)))?;

        let list = parse_token_list(&body)?;
        debug!("Fetched {} tokens from {}", list.tokens.len(), uri);
        Ok(list)
    }

    /// Fetch every URI concurrently, returning a per-URI outcome.
    pub async fn fetch_all(&self, uris: &[String]) -> Vec<ListOutcome> {
        let fetches = uris.iter().map(|uri| async move {
            let result = self.fetch(uri).await;
            if let Err(e) = &result {
                warn!("Token list fetch failed for {}: {}", uri, e);
            }
            ListOutcome {
                uri: uri.clone(),
                result,
            }
        });

        join_all(fetches).await
    }
}
