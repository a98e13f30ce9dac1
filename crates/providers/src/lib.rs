//! Chain-facing data sources.
//!
//! This crate holds everything that talks to the outside world on behalf of
//! the balance pipeline: JSON-RPC balance reads batched through the
//! multicall contract, and USD price lookups. Consumers depend on the
//! [`BalanceSource`] and [`PriceSource`] traits so tests can substitute
//! in-memory implementations.

pub mod multicall;
pub mod prices;
pub mod rpc;

use std::collections::HashMap;

use async_trait::async_trait;
use ethereum_types::U256;
use shared::{Address, ChainId, Result, TokenRef};

pub use prices::{HttpPriceSource, StaticPriceSource};
pub use rpc::EvmRpcSource;

/// A source of on-chain token balances for one owner on one chain.
///
/// The caller hands over an already-deduplicated batch. Implementations
/// either produce a raw balance for every requested token or fail the batch
/// as a whole; partial answers are not allowed. The zero address stands for
/// the chain's native coin.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_batch(
        &self,
        chain_id: ChainId,
        owner: Address,
        tokens: &[TokenRef],
    ) -> Result<HashMap<Address, U256>>;
}

/// A source of USD spot prices keyed by token address.
///
/// Tokens the source does not know are simply absent from the returned map.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn prices(
        &self,
        chain_id: ChainId,
        tokens: &[Address],
    ) -> Result<HashMap<Address, f64>>;
}
