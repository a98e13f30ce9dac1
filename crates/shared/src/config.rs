use serde::Deserialize;
use std::env;

use crate::models::ChainId;

/// RPC endpoints for one chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainEndpoint {
    pub chain_id: ChainId,
    pub primary_rpc_url: String,
    pub fallback_rpc_url: Option<String>,
}

/// Aggregator configuration, constructed once at startup and passed into
/// every component that needs it. There is no global config singleton.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// RPC endpoints keyed by chain id.
    pub chains: Vec<ChainEndpoint>,
    /// Base token-list document URIs fetched on startup.
    pub token_list_uris: Vec<String>,
    /// Maximum tokens per balance read call (default: 500).
    pub balance_batch_size: usize,
    /// Maximum tokens handled per refresh cycle chunk (default: 5000).
    /// Tunable, not semantically meaningful.
    pub refresh_chunk_size: usize,
    /// Timeout applied to every outbound HTTP request (default: 30s).
    pub http_timeout_secs: u64,
    /// Optional price service endpoint; prices are skipped when absent.
    pub price_api_url: Option<String>,
    /// Chain the controller reports balances for (default: 1).
    pub active_chain_id: ChainId,
}

impl AggregatorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(AggregatorConfig {
            chains: parse_chain_endpoints(&env::var("RPC_ENDPOINTS").unwrap_or_default())?,
            token_list_uris: split_csv(&env::var("TOKEN_LIST_URIS").unwrap_or_default()),
            balance_batch_size: env::var("BALANCE_BATCH_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
            refresh_chunk_size: env::var("REFRESH_CHUNK_SIZE")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            price_api_url: env::var("PRICE_API_URL").ok(),
            active_chain_id: env::var("ACTIVE_CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
        })
    }

    /// Look up the endpoint configured for a chain.
    pub fn endpoint(&self, chain_id: ChainId) -> Option<&ChainEndpoint> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            chains: Vec::new(),
            token_list_uris: Vec::new(),
            balance_batch_size: 500,
            refresh_chunk_size: 5000,
            http_timeout_secs: 30,
            price_api_url: None,
            active_chain_id: 1,
        }
    }
}

/// Parse `RPC_ENDPOINTS`: comma-separated `chain_id=primary[|fallback]`
/// entries, e.g. `1=https://eth.example|https://eth-backup.example,137=https://poly.example`.
fn parse_chain_endpoints(raw: &str) -> anyhow::Result<Vec<ChainEndpoint>> {
    let mut endpoints = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id_part, urls_part) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Malformed RPC_ENDPOINTS entry: {}", entry))?;

        let chain_id: ChainId = id_part.trim().parse()?;

        let mut urls = urls_part.split('|').map(str::trim);
        let primary = urls
            .next()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing RPC url for chain {}", chain_id))?;

        endpoints.push(ChainEndpoint {
            chain_id,
            primary_rpc_url: primary.to_string(),
            fallback_rpc_url: urls.next().filter(|u| !u.is_empty()).map(String::from),
        });
    }

    Ok(endpoints)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_endpoints() {
        let endpoints =
            parse_chain_endpoints("1=https://eth.example|https://eth-backup.example,137=https://poly.example")
                .unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].chain_id, 1);
        assert_eq!(endpoints[0].primary_rpc_url, "https://eth.example");
        assert_eq!(
            endpoints[0].fallback_rpc_url.as_deref(),
            Some("https://eth-backup.example")
        );
        assert_eq!(endpoints[1].chain_id, 137);
        assert!(endpoints[1].fallback_rpc_url.is_none());
    }

    #[test]
    fn test_parse_chain_endpoints_empty() {
        assert!(parse_chain_endpoints("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_chain_endpoints_malformed() {
        assert!(parse_chain_endpoints("https://no-chain-id.example").is_err());
        assert!(parse_chain_endpoints("x=https://bad-id.example").is_err());
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(
            split_csv("https://a.example, https://b.example ,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(split_csv("").is_empty());
    }

    #[test]
    fn test_default_config_constants() {
        let config = AggregatorConfig::default();
        assert_eq!(config.balance_batch_size, 500);
        assert_eq!(config.refresh_chunk_size, 5000);
        assert_eq!(config.active_chain_id, 1);
        assert!(config.endpoint(1).is_none());
    }
}
