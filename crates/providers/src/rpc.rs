//! JSON-RPC balance source for EVM chains.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::U256;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use shared::{Address, ChainEndpoint, ChainId, Error, Result, TokenRef};

use crate::multicall::{self, Call, MULTICALL_ADDRESS};
use crate::BalanceSource;

/// Reads token balances over plain JSON-RPC.
///
/// A batch is folded into a single `eth_call` against the chain's multicall
/// contract: ERC-20 entries become `balanceOf` sub-calls, and the zero
/// address, standing for the native coin, becomes a `getEthBalance`
/// sub-call against the multicall contract itself. Each endpoint gets
/// exactly one attempt per request: the primary first, then the fallback if
/// one is configured. Retry policy belongs to the caller.
pub struct EvmRpcSource {
    client: Client,
    endpoints: HashMap<ChainId, ChainEndpoint>,
    multicall_address: Address,
}

impl EvmRpcSource {
    /// Create a source for the given chain endpoints.
    pub fn new(endpoints: &[ChainEndpoint], timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoints: endpoints
                .iter()
                .map(|e| (e.chain_id, e.clone()))
                .collect(),
            multicall_address: Address::normalize(Some(MULTICALL_ADDRESS)),
        }
    }

    /// Override the multicall contract, for chains with a non-standard
    /// deployment.
    pub fn with_multicall_address(mut self, address: Address) -> Self {
        self.multicall_address = address;
        self
    }

    async fn eth_call(&self, endpoint: &ChainEndpoint, to: Address, data: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [
                {
                    "to": to.to_hex(),
                    "data": format!("0x{}", data),
                },
                "latest"
            ],
            "id": 1
        });

        self.request(endpoint, request_body).await
    }

    /// Send a request to the primary endpoint, falling back once if a
    /// fallback URL is configured.
    async fn request(&self, endpoint: &ChainEndpoint, body: Value) -> Result<String> {
        match self.send(&endpoint.primary_rpc_url, &body).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Some(fallback_url) = &endpoint.fallback_rpc_url {
                    warn!(
                        "Primary RPC failed for chain {}: {}",
                        endpoint.chain_id, e
                    );
                    debug!("Attempting fallback RPC for chain {}", endpoint.chain_id);
                    self.send(fallback_url, &body).await
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn send(&self, rpc_url: &str, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(rpc_url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to send RPC request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Rpc(format!(
                "RPC request failed with status: {}",
                response.status()
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            let error_message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            return Err(Error::Rpc(format!("RPC error: {}", error_message)));
        }

        let result = response_json
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| Error::Rpc("Missing result in RPC response".to_string()))?;

        Ok(result.to_string())
    }
}

#[async_trait]
impl BalanceSource for EvmRpcSource {
    async fn fetch_batch(
        &self,
        chain_id: ChainId,
        owner: Address,
        tokens: &[TokenRef],
    ) -> Result<HashMap<Address, U256>> {
        let endpoint = self
            .endpoints
            .get(&chain_id)
            .ok_or(Error::ChainNotConfigured(chain_id))?;

        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let mut calls: Vec<Call> = Vec::with_capacity(tokens.len());
        let mut call_order: Vec<Address> = Vec::with_capacity(tokens.len());

        for token in tokens {
            if token.address.is_zero() {
                calls.push(multicall::native_balance_call(self.multicall_address, owner));
            } else {
                calls.push(multicall::erc20_balance_call(token.address, owner));
            }
            call_order.push(token.address);
        }

        debug!(
            "Aggregating {} balance calls on chain {}",
            calls.len(),
            chain_id
        );
        let data = multicall::aggregate(&calls);
        let result = self
            .eth_call(endpoint, self.multicall_address, &data)
            .await?;
        let values = multicall::parse_aggregate_result(&result, call_order.len())?;

        let mut balances = HashMap::with_capacity(tokens.len());
        for (address, value) in call_order.into_iter().zip(values) {
            balances.insert(address, value);
        }

        Ok(balances)
    }
}
