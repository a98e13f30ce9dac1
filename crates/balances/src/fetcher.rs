//! Batched balance fetching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use providers::BalanceSource;
use shared::{Address, BalanceEntry, ChainId, Error, TokenRef};

/// Result of fetching one chain's token set.
///
/// Balances and errors coexist: a failed batch contributes an error while
/// every other batch's balances are kept.
#[derive(Debug, Default)]
pub struct ChainFetchOutcome {
    pub balances: HashMap<Address, BalanceEntry>,
    pub errors: Vec<Error>,
}

impl ChainFetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Splits token sets into bounded batches and drives them through a
/// [`BalanceSource`].
///
/// Batches for the same chain run sequentially to bound burst load on a
/// single endpoint; different chains run concurrently. There is no retry
/// here, callers re-invoke if they want another attempt.
pub struct BalanceFetcher {
    source: Arc<dyn BalanceSource>,
    batch_size: usize,
}

impl BalanceFetcher {
    pub fn new(source: Arc<dyn BalanceSource>, batch_size: usize) -> Self {
        Self {
            source,
            // chunks() panics on zero.
            batch_size: batch_size.max(1),
        }
    }

    /// Fetch balances for one owner on one chain.
    ///
    /// The token set is deduplicated by identity before any network call;
    /// requesting a token twice costs one slot. Each batch is independent:
    /// its failure is recorded and the remaining batches still run.
    pub async fn fetch_balances(
        &self,
        owner: Address,
        chain_id: ChainId,
        tokens: &[TokenRef],
    ) -> ChainFetchOutcome {
        let mut seen = HashSet::new();
        let deduped: Vec<TokenRef> = tokens
            .iter()
            .filter(|token| seen.insert(token.key()))
            .copied()
            .collect();

        let mut outcome = ChainFetchOutcome::default();
        if deduped.is_empty() {
            return outcome;
        }

        debug!(
            "Fetching {} tokens on chain {} in {} batch(es)",
            deduped.len(),
            chain_id,
            deduped.len().div_ceil(self.batch_size)
        );

        for batch in deduped.chunks(self.batch_size) {
            match self.source.fetch_batch(chain_id, owner, batch).await {
                Ok(raw) => {
                    for token in batch {
                        if let Some(value) = raw.get(&token.address) {
                            outcome
                                .balances
                                .insert(token.address, BalanceEntry::from_raw(*value, token.decimals));
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Balance batch of {} tokens failed on chain {}: {}",
                        batch.len(),
                        chain_id,
                        e
                    );
                    outcome.errors.push(e);
                }
            }
        }

        outcome
    }

    /// Fetch several chains concurrently, each chain's batches still
    /// sequential within it.
    pub async fn fetch_chains(
        &self,
        owner: Address,
        tokens_by_chain: HashMap<ChainId, Vec<TokenRef>>,
    ) -> HashMap<ChainId, ChainFetchOutcome> {
        let fetches = tokens_by_chain.into_iter().map(|(chain_id, tokens)| async move {
            let outcome = self.fetch_balances(owner, chain_id, &tokens).await;
            (chain_id, outcome)
        });

        join_all(fetches).await.into_iter().collect()
    }
}
