//! Merging token sources into a registry snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use shared::{Address, ChainId, Token};

use crate::document::TokenListDocument;

/// Immutable view of every known token, indexed by chain and address.
///
/// A snapshot is built wholesale by [`build_registry`] and never mutated
/// afterwards; consumers holding an `Arc` to a prior snapshot keep a
/// consistent view while a replacement is being built.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    chains: HashMap<ChainId, HashMap<Address, Token>>,
    built_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    pub fn token(&self, chain_id: ChainId, address: Address) -> Option<&Token> {
        self.chains.get(&chain_id)?.get(&address)
    }

    pub fn contains(&self, chain_id: ChainId, address: Address) -> bool {
        self.token(chain_id, address).is_some()
    }

    /// Tokens known for one chain, in unspecified order.
    pub fn tokens_for_chain(&self, chain_id: ChainId) -> Vec<&Token> {
        self.chains
            .get(&chain_id)
            .map(|tokens| tokens.values().collect())
            .unwrap_or_default()
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.keys().copied().collect()
    }

    /// Total token count across all chains.
    pub fn len(&self) -> usize {
        self.chains.values().map(|tokens| tokens.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.values().all(|tokens| tokens.is_empty())
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }
}

/// Merge token sources into a fresh snapshot.
///
/// Sources are applied in fixed precedence order: base lists first, then
/// user-added extra lists, then individually added tokens last. On a
/// collision for the same (chain, address) identity the later source wins
/// wholesale; fields are never merged. With `active_chain_filter` set, the
/// build runs in legacy single-chain mode and drops every entry whose chain
/// id is absent, zero, or different from the active chain. Without it,
/// entries are kept across all chains under their declared chain id.
pub fn build_registry(
    base_lists: &[TokenListDocument],
    extra_lists: &[TokenListDocument],
    extra_tokens: &[Token],
    active_chain_filter: Option<ChainId>,
) -> RegistrySnapshot {
    let mut chains: HashMap<ChainId, HashMap<Address, Token>> = HashMap::new();

    for list in base_lists.iter().chain(extra_lists.iter()) {
        for entry in &list.tokens {
            insert_token(&mut chains, entry.clone().into_token(), active_chain_filter);
        }
    }

    for token in extra_tokens {
        insert_token(&mut chains, token.clone(), active_chain_filter);
    }

    let snapshot = RegistrySnapshot {
        chains,
        built_at: Some(Utc::now()),
    };
    debug!(
        "Built registry snapshot: {} tokens across {} chains",
        snapshot.len(),
        snapshot.chain_ids().len()
    );
    snapshot
}

fn insert_token(
    chains: &mut HashMap<ChainId, HashMap<Address, Token>>,
    token: Token,
    active_chain_filter: Option<ChainId>,
) {
    if let Some(active) = active_chain_filter {
        // A missing chain id deserializes to 0 and never matches.
        if token.chain_id != active {
            return;
        }
    }

    chains
        .entry(token.chain_id)
        .or_default()
        .insert(token.address, token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_token_list;

    fn addr(raw: &str) -> Address {
        Address::normalize(Some(raw))
    }

    fn list(json: &str) -> TokenListDocument {
        parse_token_list(json).unwrap()
    }

    const AAA: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const BBB: &str = "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    #[test]
    fn test_later_source_wins_unconditionally() {
        let base = list(
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "BASE", "decimals": 18}
            ]}"#,
        );
        let extra = list(
            r#"{"tokens": [
                {"address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                 "chainId": 1, "symbol": "OVERRIDE", "decimals": 8}
            ]}"#,
        );

        let snapshot = build_registry(&[base], &[extra], &[], None);

        let token = snapshot.token(1, addr(AAA)).unwrap();
        assert_eq!(token.symbol, "OVERRIDE");
        // Last write replaces the entry wholesale, fields are not merged.
        assert_eq!(token.decimals, 8);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_individual_tokens_have_highest_precedence() {
        let base = list(
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "BASE", "decimals": 18}
            ]}"#,
        );
        let user_token = Token {
            chain_id: 1,
            address: addr(AAA),
            name: "User Renamed".to_string(),
            symbol: "USER".to_string(),
            decimals: 18,
            logo_uri: None,
        };

        let snapshot = build_registry(&[base], &[], &[user_token], None);
        assert_eq!(snapshot.token(1, addr(AAA)).unwrap().symbol, "USER");
    }

    #[test]
    fn test_build_is_deterministic_for_same_ordered_sources() {
        let base = list(
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "ONE", "decimals": 18},
                {"address": "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                 "chainId": 137, "symbol": "TWO", "decimals": 6}
            ]}"#,
        );
        let extra = list(
            r#"{"tokens": [
                {"address": "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                 "chainId": 137, "symbol": "TWO-PRIME", "decimals": 6}
            ]}"#,
        );

        let first = build_registry(&[base.clone()], &[extra.clone()], &[], None);
        let second = build_registry(&[base], &[extra], &[], None);

        assert_eq!(first.len(), second.len());
        for chain_id in first.chain_ids() {
            for token in first.tokens_for_chain(chain_id) {
                let other = second.token(chain_id, token.address).unwrap();
                assert_eq!(other.symbol, token.symbol);
            }
        }
        assert_eq!(first.token(137, addr(BBB)).unwrap().symbol, "TWO-PRIME");
    }

    #[test]
    fn test_single_chain_filter_drops_other_chains_and_missing() {
        let base = list(
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "KEEP", "decimals": 18},
                {"address": "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                 "chainId": 137, "symbol": "DROP", "decimals": 18},
                {"address": "0xCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC",
                 "symbol": "NO-CHAIN", "decimals": 18}
            ]}"#,
        );

        let snapshot = build_registry(&[base], &[], &[], Some(1));

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(1, addr(AAA)));
        assert!(!snapshot.contains(137, addr(BBB)));
    }

    #[test]
    fn test_multichain_mode_keeps_declared_chain_values() {
        let base = list(
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "ETH-SIDE", "decimals": 18},
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainID": 137, "symbol": "POLY-SIDE", "decimals": 18},
                {"address": "0xCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC",
                 "symbol": "NO-CHAIN", "decimals": 18}
            ]}"#,
        );

        let snapshot = build_registry(&[base], &[], &[], None);

        // Same address on two chains stays two distinct entries.
        assert_eq!(snapshot.token(1, addr(AAA)).unwrap().symbol, "ETH-SIDE");
        assert_eq!(snapshot.token(137, addr(AAA)).unwrap().symbol, "POLY-SIDE");
        // A missing chain id is stored under its literal zero value.
        assert!(snapshot.contains(0, addr("0xCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC")));
    }

    #[test]
    fn test_malformed_sibling_list_does_not_block_the_good_one() {
        let bodies = [
            r#"{"tokens": ["#,
            r#"{"tokens": [
                {"address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                 "chainId": 1, "symbol": "GOOD", "decimals": 18}
            ]}"#,
        ];
        let lists: Vec<TokenListDocument> = bodies
            .iter()
            .filter_map(|body| parse_token_list(body).ok())
            .collect();

        let snapshot = build_registry(&lists, &[], &[], None);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.token(1, addr(AAA)).unwrap().symbol, "GOOD");
    }

    #[test]
    fn test_snapshot_lookups_on_empty_registry() {
        let snapshot = build_registry(&[], &[], &[], None);

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
        assert!(snapshot.token(1, addr(AAA)).is_none());
        assert!(snapshot.tokens_for_chain(1).is_empty());
    }
}
