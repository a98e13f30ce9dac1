//! Wire format of published token-list documents.
//!
//! Token lists arrive as JSON over HTTPS. This module is the only place
//! where their shape is known; everything past [`parse_token_list`] works
//! with the internal [`Token`] model. Field-name drift between legacy and
//! multichain document variants (`chainId` vs `chainID`) is absorbed here
//! and nowhere else.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use shared::{Address, ChainId, Error, Result, Token};

/// Version triple carried by token-list documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ListVersion {
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
    #[serde(default)]
    pub patch: u32,
}

/// One token entry as published in a list document.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedToken {
    /// Already normalized on deserialization; malformed input becomes the
    /// zero address rather than failing the document.
    #[serde(default)]
    pub address: Address,
    #[serde(rename = "chainId", alias = "chainID", default)]
    pub chain_id: ChainId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: Option<String>,
}

impl ListedToken {
    pub fn into_token(self) -> Token {
        Token {
            chain_id: self.chain_id,
            address: self.address,
            name: self.name,
            symbol: self.symbol,
            decimals: self.decimals,
            logo_uri: self.logo_uri,
        }
    }
}

/// A published token-list document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenListDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: Option<String>,
    /// Where the document claims to live; informational only.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub version: ListVersion,
    #[serde(default)]
    pub tokens: Vec<ListedToken>,
}

/// Parse a fetched document body.
///
/// A body that is not valid JSON or does not match the expected schema
/// fails with [`Error::Schema`]; the caller discards that source and moves
/// on.
pub fn parse_token_list(body: &str) -> Result<TokenListDocument> {
    serde_json::from_str(body)
        .map_err(|e| Error::Schema(format!("Invalid token list document: {}", e)))
}
