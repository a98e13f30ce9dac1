//! Balance fetching, caching and the wallet balance controller.

pub mod cache;
pub mod controller;
pub mod fetcher;

pub use cache::BalanceCache;
pub use controller::{BalanceController, BalancesByChain};
pub use fetcher::{BalanceFetcher, ChainFetchOutcome};
