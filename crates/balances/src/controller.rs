//! Wallet balance controller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use providers::{BalanceSource, PriceSource};
use registry::{RegistryService, RegistrySnapshot};
use shared::{
    Address, AggregatorConfig, BalanceEntry, ChainId, Error, RefreshStatus, Result, Token,
    TokenRef,
};

use crate::cache::BalanceCache;
use crate::fetcher::BalanceFetcher;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Balances keyed by chain then address, as returned by refresh calls.
pub type BalancesByChain = HashMap<ChainId, HashMap<Address, BalanceEntry>>;

/// Drives balance refreshes and owns the per-owner cache.
///
/// The controller is the single writer of balance state: refresh cycles
/// fetch through the [`BalanceFetcher`], merge into the [`BalanceCache`]
/// and broadcast the cache nonce after every merge. Reads never fail and
/// never return absent values; unknown keys yield documented zero/default
/// entries.
///
/// Every refresh cycle carries a generation number. Switching the owner or
/// the active chain, or starting a newer cycle, invalidates older
/// generations: their late results are discarded instead of overwriting
/// newer state.
pub struct BalanceController {
    config: AggregatorConfig,
    registry: Arc<RegistryService>,
    fetcher: BalanceFetcher,
    cache: BalanceCache,
    price_source: Option<Arc<dyn PriceSource>>,
    owner: RwLock<Address>,
    active_chain_id: AtomicU64,
    status: RwLock<RefreshStatus>,
    last_errors: RwLock<Vec<Error>>,
    generation: AtomicU64,
    changes: broadcast::Sender<u64>,
}

impl BalanceController {
    pub fn new(
        config: AggregatorConfig,
        registry: Arc<RegistryService>,
        source: Arc<dyn BalanceSource>,
    ) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let fetcher = BalanceFetcher::new(source, config.balance_batch_size);
        let active_chain_id = AtomicU64::new(config.active_chain_id);

        Self {
            registry,
            fetcher,
            cache: BalanceCache::new(),
            price_source: None,
            owner: RwLock::new(Address::zero()),
            active_chain_id,
            status: RwLock::new(RefreshStatus::Idle),
            last_errors: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
            changes,
            config,
        }
    }

    /// Attach a price source; fetched balances get USD prices and values
    /// on a best-effort basis.
    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.price_source = Some(source);
        self
    }

    /// Switch the tracked owner account.
    ///
    /// In-flight refresh cycles for the previous owner become stale; their
    /// late results are discarded. The cache itself is wiped by the first
    /// merge under the new owner.
    pub async fn set_owner(&self, owner: Address) {
        let mut current = self.owner.write().await;
        if *current != owner {
            info!("Switching active owner to {}", owner);
            *current = owner;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub async fn owner(&self) -> Address {
        *self.owner.read().await
    }

    /// Switch the chain that `current_balances` and full refreshes cover.
    pub fn set_active_chain(&self, chain_id: ChainId) {
        if self.active_chain_id.swap(chain_id, Ordering::SeqCst) != chain_id {
            info!("Switching active chain to {}", chain_id);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn active_chain(&self) -> ChainId {
        self.active_chain_id.load(Ordering::SeqCst)
    }

    /// Composite status of the most recent refresh attempt.
    pub async fn status(&self) -> RefreshStatus {
        *self.status.read().await
    }

    /// Errors retained from the most recent refresh attempt.
    pub async fn last_errors(&self) -> Vec<Error> {
        self.last_errors.read().await.clone()
    }

    /// Receiver of cache nonces, one per merge.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.changes.subscribe()
    }

    pub async fn cache_nonce(&self) -> u64 {
        self.cache.nonce().await
    }

    /// Cached entries for the active chain.
    pub async fn current_balances(&self) -> HashMap<Address, BalanceEntry> {
        self.cache.read_chain(self.active_chain()).await
    }

    /// Everything cached, across all chains.
    pub async fn balances(&self) -> BalancesByChain {
        self.cache.read().await
    }

    /// Balance for one (chain, address) pair; the zero entry when absent.
    pub async fn get_balance(&self, chain_id: ChainId, address: Address) -> BalanceEntry {
        self.cache
            .get(chain_id, address)
            .await
            .unwrap_or_else(BalanceEntry::zero)
    }

    /// Token metadata for one (chain, address) pair; a default placeholder
    /// when the registry does not know it.
    pub async fn get_token(&self, chain_id: ChainId, address: Address) -> Token {
        let snapshot = self.registry.snapshot().await;
        snapshot
            .token(chain_id, address)
            .cloned()
            .unwrap_or_else(|| Token::unknown(chain_id, address))
    }

    /// Refresh balances.
    ///
    /// With a subset, only those tokens are fetched; tokens the registry
    /// does not know yet are persisted as user additions afterwards (the
    /// add-a-custom-token flow). Without a subset, the full known token
    /// set of the active chain is refreshed. Returns the cache content
    /// after the cycle; fetch failures are reported through
    /// [`status`](Self::status) and [`last_errors`](Self::last_errors)
    /// rather than the `Result`, which only carries storage failures.
    pub async fn refresh(&self, tokens: Option<&[TokenRef]>) -> Result<BalancesByChain> {
        match tokens {
            Some(subset) => self.refresh_subset(subset).await,
            None => self.refresh_full().await,
        }
    }

    /// Fetch balances for tokens of an updated registry snapshot that are
    /// not cached yet.
    ///
    /// Chains without a configured endpoint are skipped. When everything
    /// in the snapshot is already cached this is a no-op that leaves the
    /// current status untouched.
    pub async fn refresh_with_list(&self, snapshot: &RegistrySnapshot) -> Result<BalancesByChain> {
        let mut by_chain: HashMap<ChainId, Vec<TokenRef>> = HashMap::new();
        for chain_id in snapshot.chain_ids() {
            if self.config.endpoint(chain_id).is_none() {
                debug!("Skipping unconfigured chain {} in list refresh", chain_id);
                continue;
            }

            let cached = self.cache.read_chain(chain_id).await;
            let missing: Vec<TokenRef> = snapshot
                .tokens_for_chain(chain_id)
                .into_iter()
                .filter(|token| !cached.contains_key(&token.address))
                .map(TokenRef::from)
                .collect();

            if !missing.is_empty() {
                by_chain.insert(chain_id, missing);
            }
        }

        if by_chain.is_empty() {
            debug!("List refresh found no new tokens to fetch");
            return Ok(self.cache.read().await);
        }

        let generation = self.begin_cycle().await;
        let owner = self.owner().await;
        let total: usize = by_chain.values().map(|tokens| tokens.len()).sum();
        info!(
            "Fetching {} new token(s) across {} chain(s) from updated list",
            total,
            by_chain.len()
        );

        let outcomes = self.fetcher.fetch_chains(owner, by_chain).await;

        if self.is_stale(generation) {
            debug!("Discarding superseded list refresh {}", generation);
            return Ok(self.cache.read().await);
        }

        let mut errors = Vec::new();
        let mut has_data = false;
        for (chain_id, outcome) in outcomes {
            errors.extend(outcome.errors);
            if !outcome.balances.is_empty() {
                has_data = true;
                self.merge_and_notify(generation, owner, chain_id, outcome.balances.clone())
                    .await;
                self.attach_prices(generation, owner, chain_id, &outcome.balances)
                    .await;
            }
        }

        self.finish_cycle(generation, errors, has_data).await;
        Ok(self.cache.read().await)
    }

    /// Spawn a background task running a full refresh on a fixed interval.
    ///
    /// The first tick fires immediately, giving an initial load.
    pub fn start_auto_refresh(
        self: Arc<Self>,
        refresh_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting balance auto-refresh with interval: {:?}",
            refresh_interval
        );

        tokio::spawn(async move {
            let mut ticker = interval(refresh_interval);

            loop {
                ticker.tick().await;
                debug!("Balance auto-refresh tick");

                if let Err(e) = self.refresh(None).await {
                    error!("Balance auto-refresh failed: {}", e);
                }
            }
        })
    }

    /// Spawn a background task reacting to registry rebuilds by fetching
    /// balances for tokens new to the cache.
    pub fn start_registry_sync(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut snapshots = self.registry.subscribe();

        tokio::spawn(async move {
            loop {
                match snapshots.recv().await {
                    Ok(snapshot) => {
                        if let Err(e) = self.refresh_with_list(&snapshot).await {
                            error!("List-triggered refresh failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Registry sync lagged, missed {} snapshot(s)", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Registry event channel closed, stopping sync task");
                        break;
                    }
                }
            }
        })
    }

    async fn refresh_full(&self) -> Result<BalancesByChain> {
        let generation = self.begin_cycle().await;
        let owner = self.owner().await;
        let chain_id = self.active_chain();

        let snapshot = self.registry.snapshot().await;
        let refs: Vec<TokenRef> = snapshot
            .tokens_for_chain(chain_id)
            .into_iter()
            .map(TokenRef::from)
            .collect();

        info!(
            "Refreshing {} token(s) on chain {} for {}",
            refs.len(),
            chain_id,
            owner
        );

        let mut errors = Vec::new();
        let mut has_data = false;

        for chunk in refs.chunks(self.config.refresh_chunk_size.max(1)) {
            if self.is_stale(generation) {
                debug!("Discarding superseded refresh cycle {}", generation);
                return Ok(self.cache.read().await);
            }

            let outcome = self.fetcher.fetch_balances(owner, chain_id, chunk).await;

            if self.is_stale(generation) {
                debug!("Discarding superseded refresh cycle {}", generation);
                return Ok(self.cache.read().await);
            }

            errors.extend(outcome.errors);
            if !outcome.balances.is_empty() {
                has_data = true;
                self.merge_and_notify(generation, owner, chain_id, outcome.balances.clone())
                    .await;
                self.attach_prices(generation, owner, chain_id, &outcome.balances)
                    .await;
            }
        }

        self.finish_cycle(generation, errors, has_data).await;
        Ok(self.cache.read().await)
    }

    async fn refresh_subset(&self, subset: &[TokenRef]) -> Result<BalancesByChain> {
        let generation = self.begin_cycle().await;
        let owner = self.owner().await;

        info!("Refreshing {} explicitly requested token(s)", subset.len());

        let mut by_chain: HashMap<ChainId, Vec<TokenRef>> = HashMap::new();
        for token in subset {
            by_chain.entry(token.chain_id).or_default().push(*token);
        }

        let outcomes = self.fetcher.fetch_chains(owner, by_chain).await;

        if self.is_stale(generation) {
            debug!("Discarding superseded subset refresh {}", generation);
            return Ok(self.cache.read().await);
        }

        let mut errors = Vec::new();
        let mut has_data = false;
        for (chain_id, outcome) in outcomes {
            errors.extend(outcome.errors);
            if !outcome.balances.is_empty() {
                has_data = true;
                self.merge_and_notify(generation, owner, chain_id, outcome.balances.clone())
                    .await;
                self.attach_prices(generation, owner, chain_id, &outcome.balances)
                    .await;
            }
        }

        // The cycle finalizes even when persistence fails; the storage
        // error joins the retained errors before it surfaces in the Result.
        let persisted = self.persist_new_tokens(subset).await;
        if let Err(e) = &persisted {
            errors.push(e.clone());
        }

        self.finish_cycle(generation, errors, has_data).await;
        persisted?;
        Ok(self.cache.read().await)
    }

    /// Persist subset tokens the registry does not know yet as user-added
    /// tokens; known tokens are left alone.
    async fn persist_new_tokens(&self, subset: &[TokenRef]) -> Result<()> {
        let snapshot = self.registry.snapshot().await;

        for token_ref in subset {
            if snapshot.contains(token_ref.chain_id, token_ref.address) {
                continue;
            }

            let mut token = Token::unknown(token_ref.chain_id, token_ref.address);
            token.decimals = token_ref.decimals;
            debug!(
                "Persisting user-added token {} on chain {}",
                token.address, token.chain_id
            );
            self.registry.add_token(token).await?;
        }

        Ok(())
    }

    async fn begin_cycle(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.status.write().await = RefreshStatus::Loading;
        self.last_errors.write().await.clear();
        generation
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    async fn finish_cycle(&self, generation: u64, errors: Vec<Error>, has_data: bool) {
        if self.is_stale(generation) {
            debug!("Skipping status update for superseded cycle {}", generation);
            return;
        }

        // Error only when the attempt produced nothing at all; partial
        // data still counts as success.
        let status = if !errors.is_empty() && !has_data {
            RefreshStatus::Error
        } else {
            RefreshStatus::Success
        };

        *self.last_errors.write().await = errors;
        *self.status.write().await = status;
    }

    /// Merge a partial result into the cache and broadcast the new nonce.
    ///
    /// The staleness check sits here, at the single gateway to the cache,
    /// so a cycle superseded during any earlier await merges nothing.
    async fn merge_and_notify(
        &self,
        generation: u64,
        owner: Address,
        chain_id: ChainId,
        partial: HashMap<Address, BalanceEntry>,
    ) {
        if self.is_stale(generation) {
            debug!("Discarding merge from superseded cycle {}", generation);
            return;
        }

        let nonce = self.cache.merge(owner, chain_id, partial).await;
        if self.changes.send(nonce).is_err() {
            debug!("No balance subscribers for nonce {}", nonce);
        }
    }

    /// Decorate just-fetched entries with USD prices through a second
    /// merge. Price failures are logged and never affect refresh status;
    /// a cycle superseded while the lookup was in flight merges nothing.
    async fn attach_prices(
        &self,
        generation: u64,
        owner: Address,
        chain_id: ChainId,
        entries: &HashMap<Address, BalanceEntry>,
    ) {
        let Some(source) = &self.price_source else {
            return;
        };
        if entries.is_empty() {
            return;
        }

        let addresses: Vec<Address> = entries.keys().copied().collect();
        match source.prices(chain_id, &addresses).await {
            Ok(prices) if !prices.is_empty() => {
                let decorated: HashMap<Address, BalanceEntry> = entries
                    .iter()
                    .filter_map(|(address, entry)| {
                        prices
                            .get(address)
                            .map(|price| (*address, entry.clone().with_price(*price)))
                    })
                    .collect();
                self.merge_and_notify(generation, owner, chain_id, decorated)
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Price lookup failed for chain {}: {}", chain_id, e);
            }
        }
    }
}
