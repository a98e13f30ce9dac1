use chrono::{DateTime, Utc};
use ethereum_types::U256;
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Integer identifier of a blockchain network.
pub type ChainId = u64;

/// Token metadata as known to the registry.
///
/// Identity is the pair (chain_id, address); two descriptors with the same
/// identity are the same token regardless of which source supplied them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub chain_id: ChainId,
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub logo_uri: Option<String>,
}

impl Token {
    pub fn key(&self) -> (ChainId, Address) {
        (self.chain_id, self.address)
    }

    /// Placeholder returned by lookups that miss, so callers never handle an
    /// absent token. Decimals default to 18, the dominant ERC-20 precision.
    pub fn unknown(chain_id: ChainId, address: Address) -> Self {
        Token {
            chain_id,
            address,
            name: String::new(),
            symbol: String::new(),
            decimals: 18,
            logo_uri: None,
        }
    }
}

/// Minimal per-token descriptor handed to balance fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRef {
    pub chain_id: ChainId,
    pub address: Address,
    pub decimals: u8,
}

impl TokenRef {
    pub fn key(&self) -> (ChainId, Address) {
        (self.chain_id, self.address)
    }
}

impl From<&Token> for TokenRef {
    fn from(token: &Token) -> Self {
        TokenRef {
            chain_id: token.chain_id,
            address: token.address,
            decimals: token.decimals,
        }
    }
}

/// Balance of one token for the tracked owner.
///
/// `raw` is in the token's smallest native unit. `display` is the exact
/// decimal rendering of `raw / 10^decimals`, computed with integer
/// arithmetic only; `normalized` is derived from `display` and is the only
/// floating-point view of the amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceEntry {
    pub raw: U256,
    pub decimals: u8,
    pub normalized: f64,
    pub display: String,
    pub price_usd: Option<f64>,
    pub value_usd: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceEntry {
    /// Build a complete entry from a raw on-chain amount.
    pub fn from_raw(raw: U256, decimals: u8) -> Self {
        let display = format_units(raw, decimals);
        let normalized = display.parse::<f64>().unwrap_or(0.0);

        BalanceEntry {
            raw,
            decimals,
            normalized,
            display,
            price_usd: None,
            value_usd: None,
            updated_at: Utc::now(),
        }
    }

    /// The documented zero entry (raw = 0, normalized = 0) returned for
    /// unknown keys.
    pub fn zero() -> Self {
        Self::from_raw(U256::zero(), 0)
    }

    /// Attach a USD price, deriving the entry's value from its normalized
    /// amount.
    pub fn with_price(mut self, price_usd: f64) -> Self {
        self.value_usd = Some(self.normalized * price_usd);
        self.price_usd = Some(price_usd);
        self
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self::zero()
    }
}

/// Composite outcome of the most recent refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    /// No refresh attempted yet in this session.
    Idle,
    /// A refresh is outstanding.
    Loading,
    /// The most recent refresh completed, possibly with partial data.
    Success,
    /// The most recent full refresh failed outright.
    Error,
}

impl RefreshStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, RefreshStatus::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshStatus::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RefreshStatus::Error)
    }
}

impl Default for RefreshStatus {
    fn default() -> Self {
        RefreshStatus::Idle
    }
}

/// Render `raw / 10^decimals` as an exact decimal string.
///
/// Uses U256 division and remainder only; no floating point touches the raw
/// amount. Trailing zeros in the fractional part are trimmed.
pub fn format_units(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }

    let Some(divisor) = U256::from(10u64).checked_pow(U256::from(decimals)) else {
        // 10^decimals exceeds 2^256, so the whole part is always zero.
        let mut frac = format!("{:0>width$}", raw.to_string(), width = decimals as usize);
        while frac.ends_with('0') {
            frac.pop();
        }
        if frac.is_empty() {
            return "0".to_string();
        }
        return format!("0.{}", frac);
    };

    let whole = raw / divisor;
    let frac = raw % divisor;

    if frac.is_zero() {
        return whole.to_string();
    }

    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    while frac_str.ends_with('0') {
        frac_str.pop();
    }

    format!("{}.{}", whole, frac_str)
}
