//! USD price lookups for balance decoration.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use shared::{Address, ChainId, Error, Result};

use crate::PriceSource;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    /// Decimal price strings keyed by token address.
    prices: HashMap<String, String>,
}

/// Price source backed by an HTTP price API.
///
/// Issues one GET per chain with the requested addresses in canonical form.
/// The API answers with decimal price strings; entries whose key or price
/// fails to parse are dropped with a warning rather than failing the lookup.
pub struct HttpPriceSource {
    client: Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn prices(
        &self,
        chain_id: ChainId,
        tokens: &[Address],
    ) -> Result<HashMap<Address, f64>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let addresses = tokens
            .iter()
            .map(|a| a.to_hex())
            .collect::<Vec<String>>()
            .join(",");
        let url = format!(
            "{}/prices?chain={}&addresses={}",
            self.base_url, chain_id, addresses
        );

        debug!("Fetching {} prices for chain {}", tokens.len(), chain_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Price(format!("Failed to send price request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Price(format!(
                "Price request failed with status: {}",
                response.status()
            )));
        }

        let parsed: PriceResponse = response
            .json()
            .await
            .map_err(|e| Error::Price(format!("Failed to parse price response: {}", e)))?;

        let mut prices = HashMap::with_capacity(parsed.prices.len());
        for (raw, price) in parsed.prices {
            let address = Address::normalize(Some(&raw));
            if address.is_zero() && raw != address.to_hex() {
                warn!("Skipping price for unrecognized address {}", raw);
                continue;
            }
            match price.parse::<f64>() {
                Ok(price_usd) => {
                    prices.insert(address, price_usd);
                }
                Err(_) => {
                    warn!("Skipping unparseable price {:?} for {}", price, raw);
                }
            }
        }

        Ok(prices)
    }
}

/// Fixed in-memory price table.
///
/// Useful in tests and local setups where no price API is available.
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<(ChainId, Address), f64>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, chain_id: ChainId, address: Address, price_usd: f64) -> Self {
        self.prices.insert((chain_id, address), price_usd);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn prices(
        &self,
        chain_id: ChainId,
        tokens: &[Address],
    ) -> Result<HashMap<Address, f64>> {
        let mut out = HashMap::new();
        for token in tokens {
            if let Some(&price) = self.prices.get(&(chain_id, *token)) {
                out.insert(*token, price);
            }
        }
        Ok(out)
    }
}
