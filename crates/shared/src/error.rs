use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Token list schema error: {0}")]
    Schema(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Chain {0} is not configured")]
    ChainNotConfigured(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Price feed error: {0}")]
    Price(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
