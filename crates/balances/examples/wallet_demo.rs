//! End-to-end demo: load config, build the registry and controller, then
//! print the tracked wallet's balances.
//!
//! Needs `RPC_ENDPOINTS`, `TOKEN_LIST_URIS` and `WALLET_ADDRESS` in the
//! environment (or a `.env` file), e.g.
//!
//! ```text
//! RPC_ENDPOINTS=1=https://eth.llamarpc.com|https://rpc.ankr.com/eth
//! TOKEN_LIST_URIS=https://tokens.coingecko.com/uniswap/all.json
//! WALLET_ADDRESS=0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045
//! ```

use std::sync::Arc;

use anyhow::Result;
use balances::BalanceController;
use providers::{EvmRpcSource, HttpPriceSource, PriceSource};
use registry::{FileTokenStore, ListFetcher, RegistryService};
use shared::{Address, AggregatorConfig};
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,balances=debug,registry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AggregatorConfig::from_env()?;
    let timeout = Duration::from_secs(config.http_timeout_secs);
    tracing::info!(
        "Configuration loaded: {} chain(s), {} base list(s)",
        config.chains.len(),
        config.token_list_uris.len()
    );

    let owner = Address::normalize(std::env::var("WALLET_ADDRESS").ok().as_deref());
    if owner.is_zero() {
        anyhow::bail!("WALLET_ADDRESS is missing or not a valid address");
    }

    // Build the token registry from the configured lists plus anything the
    // user added in earlier runs.
    let store = Arc::new(FileTokenStore::new("./wallet-data"));
    let registry = Arc::new(RegistryService::new(
        ListFetcher::new(timeout),
        store,
        config.token_list_uris.clone(),
        Some(config.active_chain_id),
    ));
    let snapshot = registry.init().await?;
    tracing::info!("Registry ready with {} token(s)", snapshot.len());

    // Wire the controller to the on-chain source and optional price feed.
    let source = Arc::new(EvmRpcSource::new(&config.chains, timeout));
    let price_source = config
        .price_api_url
        .clone()
        .map(|url| Arc::new(HttpPriceSource::new(url, timeout)) as Arc<dyn PriceSource>);

    let mut controller = BalanceController::new(config, registry.clone(), source);
    if let Some(prices) = price_source {
        controller = controller.with_price_source(prices);
    }
    let controller = Arc::new(controller);
    controller.set_owner(owner).await;

    // Background plumbing: periodic list refresh and list-driven fetches.
    let _list_handle = registry.clone().start_auto_refresh(Duration::from_secs(600));
    let _sync_handle = controller.clone().start_registry_sync();

    // One full refresh, then print whatever holds a balance.
    controller.refresh(None).await?;

    let balances = controller.current_balances().await;
    let mut held: Vec<_> = balances
        .iter()
        .filter(|(_, entry)| !entry.is_zero())
        .collect();
    held.sort_by(|a, b| {
        b.1.value_usd
            .unwrap_or(0.0)
            .total_cmp(&a.1.value_usd.unwrap_or(0.0))
    });

    println!("\n{} token(s) with a balance on chain {}:", held.len(), controller.active_chain());
    for (address, entry) in held {
        let token = controller.get_token(controller.active_chain(), *address).await;
        let symbol = if token.symbol.is_empty() {
            address.to_string()
        } else {
            token.symbol.clone()
        };
        match entry.value_usd {
            Some(value) => println!("  {:<12} {:>24}  (${:.2})", symbol, entry.display, value),
            None => println!("  {:<12} {:>24}", symbol, entry.display),
        }
    }

    Ok(())
}
