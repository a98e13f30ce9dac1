//! Service owning the token sources and the published snapshot.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use shared::{ChainId, Result, Token};

use crate::aggregator::{build_registry, RegistrySnapshot};
use crate::document::TokenListDocument;
use crate::fetcher::ListFetcher;
use crate::store::UserTokenStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The inputs a snapshot is built from, in precedence order.
#[derive(Default)]
struct Sources {
    base_lists: Vec<TokenListDocument>,
    extra_uris: Vec<String>,
    extra_lists: Vec<TokenListDocument>,
    user_tokens: Vec<Token>,
}

/// Owns the token sources and the current registry snapshot.
///
/// All source mutation goes through this service: it fetches list
/// documents, persists the user's additions, rebuilds the snapshot
/// wholesale and broadcasts the replacement to subscribers. Consumers only
/// ever observe complete snapshots.
pub struct RegistryService {
    fetcher: ListFetcher,
    store: Arc<dyn UserTokenStore>,
    base_uris: Vec<String>,
    active_chain_filter: Option<ChainId>,
    sources: RwLock<Sources>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    events: broadcast::Sender<Arc<RegistrySnapshot>>,
}

impl RegistryService {
    pub fn new(
        fetcher: ListFetcher,
        store: Arc<dyn UserTokenStore>,
        base_uris: Vec<String>,
        active_chain_filter: Option<ChainId>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            fetcher,
            store,
            base_uris,
            active_chain_filter,
            sources: RwLock::new(Sources::default()),
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            events,
        }
    }

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Receiver of replacement snapshots, one per rebuild.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RegistrySnapshot>> {
        self.events.subscribe()
    }

    /// Load persisted user sources, fetch every configured list and publish
    /// the first snapshot.
    ///
    /// Individual list failures are logged and skipped; only a storage
    /// failure aborts initialization.
    pub async fn init(&self) -> Result<Arc<RegistrySnapshot>> {
        let extra_uris = self.store.load_list_uris().await?;
        let user_tokens = self.store.load_user_tokens().await?;

        info!(
            "Initializing registry: {} base lists, {} extra lists, {} user tokens",
            self.base_uris.len(),
            extra_uris.len(),
            user_tokens.len()
        );

        let base_lists = self.fetch_lists(&self.base_uris).await;
        let extra_lists = self.fetch_lists(&extra_uris).await;

        {
            let mut sources = self.sources.write().await;
            sources.base_lists = base_lists;
            sources.extra_uris = extra_uris;
            sources.extra_lists = extra_lists;
            sources.user_tokens = user_tokens;
        }

        Ok(self.rebuild_and_publish().await)
    }

    /// Re-fetch every configured list and publish a fresh snapshot.
    pub async fn refresh_lists(&self) -> Result<Arc<RegistrySnapshot>> {
        let extra_uris = self.sources.read().await.extra_uris.clone();

        let base_lists = self.fetch_lists(&self.base_uris).await;
        let extra_lists = self.fetch_lists(&extra_uris).await;

        {
            let mut sources = self.sources.write().await;
            sources.base_lists = base_lists;
            sources.extra_lists = extra_lists;
        }

        Ok(self.rebuild_and_publish().await)
    }

    /// Add a user list URI: persist it, fetch its document, rebuild.
    ///
    /// The URI is persisted even when its first fetch fails, so it still
    /// participates in later refreshes. Adding a URI twice is a no-op
    /// beyond the re-fetch.
    pub async fn add_list_uri(&self, uri: &str) -> Result<Arc<RegistrySnapshot>> {
        let uris = {
            let mut sources = self.sources.write().await;
            if !sources.extra_uris.iter().any(|u| u == uri) {
                sources.extra_uris.push(uri.to_string());
            }
            sources.extra_uris.clone()
        };

        self.store.save_list_uris(&uris).await?;

        let extra_lists = self.fetch_lists(&uris).await;
        {
            let mut sources = self.sources.write().await;
            sources.extra_lists = extra_lists;
        }

        Ok(self.rebuild_and_publish().await)
    }

    /// Add an individually chosen token: persist it and rebuild.
    ///
    /// A token with the same (chain, address) identity replaces the
    /// previous user entry instead of accumulating duplicates.
    pub async fn add_token(&self, token: Token) -> Result<Arc<RegistrySnapshot>> {
        let tokens = {
            let mut sources = self.sources.write().await;
            sources.user_tokens.retain(|t| t.key() != token.key());
            sources.user_tokens.push(token);
            sources.user_tokens.clone()
        };

        self.store.save_user_tokens(&tokens).await?;

        Ok(self.rebuild_and_publish().await)
    }

    /// Spawn a background task re-fetching all lists on a fixed interval.
    pub fn start_auto_refresh(
        self: Arc<Self>,
        refresh_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting registry auto-refresh with interval: {:?}",
            refresh_interval
        );

        tokio::spawn(async move {
            let mut ticker = interval(refresh_interval);
            // interval fires immediately; init already produced a snapshot.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                debug!("Registry auto-refresh tick");

                if let Err(e) = self.refresh_lists().await {
                    error!("Registry auto-refresh failed: {}", e);
                }
            }
        })
    }

    async fn fetch_lists(&self, uris: &[String]) -> Vec<TokenListDocument> {
        self.fetcher
            .fetch_all(uris)
            .await
            .into_iter()
            .filter_map(|outcome| outcome.result.ok())
            .collect()
    }

    async fn rebuild_and_publish(&self) -> Arc<RegistrySnapshot> {
        let rebuilt = {
            let sources = self.sources.read().await;
            Arc::new(build_registry(
                &sources.base_lists,
                &sources.extra_lists,
                &sources.user_tokens,
                self.active_chain_filter,
            ))
        };

        {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = rebuilt.clone();
        }

        if self.events.send(rebuilt.clone()).is_err() {
            debug!("No registry subscribers for rebuilt snapshot");
        }

        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use shared::Address;

    fn service_with_store(store: Arc<MemoryTokenStore>) -> RegistryService {
        RegistryService::new(
            ListFetcher::new(Duration::from_millis(250)),
            store,
            Vec::new(),
            None,
        )
    }

    fn dai() -> Token {
        Token {
            chain_id: 1,
            address: Address::normalize(Some("0x6B175474E89094C44Da98b954EedeAC495271d0F")),
            name: "Dai Stablecoin".to_string(),
            symbol: "DAI".to_string(),
            decimals: 18,
            logo_uri: None,
        }
    }

    #[tokio::test]
    async fn test_init_loads_persisted_user_tokens() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save_user_tokens(&[dai()]).await.unwrap();

        let service = service_with_store(store);
        let snapshot = service.init().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.token(1, dai().address).unwrap().symbol, "DAI");
    }

    #[tokio::test]
    async fn test_add_token_rebuilds_persists_and_notifies() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with_store(store.clone());
        service.init().await.unwrap();

        let mut events = service.subscribe();
        let snapshot = service.add_token(dai()).await.unwrap();

        assert!(snapshot.contains(1, dai().address));

        let published = events.recv().await.unwrap();
        assert!(published.contains(1, dai().address));

        let persisted = store.load_user_tokens().await.unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn test_add_token_replaces_same_identity() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with_store(store.clone());
        service.init().await.unwrap();

        service.add_token(dai()).await.unwrap();

        let mut renamed = dai();
        renamed.symbol = "DAI-V2".to_string();
        let snapshot = service.add_token(renamed).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.token(1, dai().address).unwrap().symbol, "DAI-V2");
        assert_eq!(store.load_user_tokens().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_list_uri_persists_even_when_fetch_fails() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with_store(store.clone());
        service.init().await.unwrap();

        // Reserved TEST-NET-1 address, the fetch cannot succeed.
        let uri = "http://192.0.2.1/list.json";
        let snapshot = service.add_list_uri(uri).await.unwrap();

        assert!(snapshot.is_empty());
        assert_eq!(store.load_list_uris().await.unwrap(), vec![uri.to_string()]);
    }

    // Requires network access.
    #[tokio::test]
    #[ignore]
    async fn test_init_with_live_base_list() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = RegistryService::new(
            ListFetcher::new(Duration::from_secs(30)),
            store,
            vec!["https://tokens.uniswap.org".to_string()],
            Some(1),
        );

        let snapshot = service.init().await.unwrap();
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.chain_ids(), vec![1]);
    }
}
