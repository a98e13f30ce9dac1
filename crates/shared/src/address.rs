use ethereum_types::H160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical 20-byte account/contract identifier.
///
/// Every token and owner address entering the system is normalized into this
/// form before it is used as a map key, so any two spellings of the same
/// account compare equal. Empty or malformed input normalizes to the
/// zero-address sentinel instead of raising an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(H160);

impl Address {
    /// The zero-address sentinel produced for empty or malformed input.
    pub fn zero() -> Self {
        Address(H160::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Normalize a textual address into canonical form.
    ///
    /// Accepts exactly 40 hex digits, with or without a `0x`/`0X` prefix, in
    /// any casing. Anything else yields the zero address. Total and
    /// idempotent; never panics.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::zero();
        };

        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::zero();
        }

        match H160::from_str(hex_part) {
            Ok(inner) => Address(inner),
            Err(_) => Self::zero(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Canonical text form: `0x` followed by 40 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    /// The 40 hex digits without the `0x` prefix, as used in calldata.
    pub fn to_raw_hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<H160> for Address {
    fn from(inner: H160) -> Self {
        Address(inner)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::normalize(Some(raw))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // The parsing boundary for addresses: any string is accepted and
        // routed through normalize, so malformed documents cannot fail
        // deserialization here.
        let raw = String::deserialize(deserializer)?;
        Ok(Address::normalize(Some(&raw)))
    }
}
