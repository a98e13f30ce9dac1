//! Owner-scoped balance cache.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use shared::{Address, BalanceEntry, ChainId};

#[derive(Default)]
struct CacheInner {
    owner: Option<Address>,
    chains: HashMap<ChainId, HashMap<Address, BalanceEntry>>,
    nonce: u64,
}

/// Authoritative store of fetched balances for exactly one owner.
///
/// Merges are per-key overwrites: an incoming partial replaces the entries
/// it names and never touches the rest, so partials arriving out of order
/// from concurrently resolving batches converge to the same final state.
/// If a merge arrives for a different owner than the one currently
/// tracked, the whole cache is discarded first; balances never leak across
/// accounts. A monotonic nonce increments on every merge so consumers can
/// detect change without deep comparison.
#[derive(Default)]
pub struct BalanceCache {
    inner: RwLock<CacheInner>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial result for one chain, returning the new nonce.
    pub async fn merge(
        &self,
        owner: Address,
        chain_id: ChainId,
        partial: HashMap<Address, BalanceEntry>,
    ) -> u64 {
        let mut inner = self.inner.write().await;

        if inner.owner != Some(owner) {
            if inner.owner.is_some() {
                debug!("Cache owner changed to {}, discarding all entries", owner);
            }
            inner.chains.clear();
            inner.owner = Some(owner);
        }

        let entries = inner.chains.entry(chain_id).or_default();
        for (address, entry) in partial {
            entries.insert(address, entry);
        }

        inner.nonce += 1;
        inner.nonce
    }

    /// Snapshot of everything cached, keyed by chain then address.
    pub async fn read(&self) -> HashMap<ChainId, HashMap<Address, BalanceEntry>> {
        self.inner.read().await.chains.clone()
    }

    /// Snapshot of one chain's entries.
    pub async fn read_chain(&self, chain_id: ChainId) -> HashMap<Address, BalanceEntry> {
        self.inner
            .read()
            .await
            .chains
            .get(&chain_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get(&self, chain_id: ChainId, address: Address) -> Option<BalanceEntry> {
        self.inner
            .read()
            .await
            .chains
            .get(&chain_id)
            .and_then(|entries| entries.get(&address))
            .cloned()
    }

    pub async fn contains(&self, chain_id: ChainId, address: Address) -> bool {
        self.get(chain_id, address).await.is_some()
    }

    pub async fn nonce(&self) -> u64 {
        self.inner.read().await.nonce
    }

    pub async fn owner(&self) -> Option<Address> {
        self.inner.read().await.owner
    }
}
