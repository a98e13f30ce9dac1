//! Token registry: list fetching, source merging and user additions.
//!
//! The registry turns remote token-list documents plus the user's own
//! additions into immutable [`RegistrySnapshot`]s. Snapshots are rebuilt
//! wholesale whenever a source changes and handed out behind `Arc`, so a
//! consumer never observes a half-updated view.

pub mod aggregator;
pub mod document;
pub mod fetcher;
pub mod service;
pub mod store;

pub use aggregator::{build_registry, RegistrySnapshot};
pub use document::{parse_token_list, ListVersion, ListedToken, TokenListDocument};
pub use fetcher::{ListFetcher, ListOutcome};
pub use service::RegistryService;
pub use store::{FileTokenStore, MemoryTokenStore, UserTokenStore};
