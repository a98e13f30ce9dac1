pub mod address;
pub mod config;
pub mod error;
pub mod models;

pub use address::Address;
pub use config::{AggregatorConfig, ChainEndpoint};
pub use error::{Error, Result};
pub use models::{format_units, BalanceEntry, ChainId, RefreshStatus, Token, TokenRef};
