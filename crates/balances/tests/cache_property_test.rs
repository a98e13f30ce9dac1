// Property-based tests for balance cache merge laws.

use std::collections::HashMap;

use balances::BalanceCache;
use ethereum_types::{H160, U256};
use proptest::prelude::*;
use shared::{Address, BalanceEntry};

fn owner(byte: u8) -> Address {
    Address::from(H160::repeat_byte(byte))
}

fn entry_map(items: &[(u8, u64)]) -> HashMap<Address, BalanceEntry> {
    items
        .iter()
        .map(|(byte, value)| {
            (
                Address::from(H160::repeat_byte(*byte)),
                BalanceEntry::from_raw(U256::from(*value), 18),
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Merges touching different chains commute: either order produces the
    /// same cache content.
    #[test]
    fn prop_disjoint_chain_merges_commute(
        first in proptest::collection::vec((any::<u8>(), any::<u64>()), 1..20),
        second in proptest::collection::vec((any::<u8>(), any::<u64>()), 1..20),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (a, b) = (entry_map(&first), entry_map(&second));

            let forward = BalanceCache::new();
            forward.merge(owner(0xaa), 1, a.clone()).await;
            forward.merge(owner(0xaa), 137, b.clone()).await;

            let backward = BalanceCache::new();
            backward.merge(owner(0xaa), 137, b).await;
            backward.merge(owner(0xaa), 1, a).await;

            prop_assert_eq!(forward.read().await, backward.read().await);
            Ok(())
        })?;
    }

    /// Every merge advances the nonce by exactly one, whatever it carries.
    #[test]
    fn prop_nonce_counts_merges(
        batches in proptest::collection::vec(
            proptest::collection::vec((any::<u8>(), any::<u64>()), 0..8),
            1..12,
        ),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let cache = BalanceCache::new();

            for (i, batch) in batches.iter().enumerate() {
                let nonce = cache.merge(owner(0xaa), 1, entry_map(batch)).await;
                prop_assert_eq!(nonce, (i + 1) as u64);
            }

            prop_assert_eq!(cache.nonce().await, batches.len() as u64);
            Ok(())
        })?;
    }

    /// A merge for a different owner always wipes first: afterwards the
    /// cache holds exactly that merge's content, nothing older.
    #[test]
    fn prop_owner_switch_always_wipes(
        before in proptest::collection::vec((any::<u8>(), any::<u64>()), 1..20),
        after in proptest::collection::vec((any::<u8>(), any::<u64>()), 1..20),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let cache = BalanceCache::new();
            cache.merge(owner(0xaa), 1, entry_map(&before)).await;
            cache.merge(owner(0xaa), 137, entry_map(&before)).await;

            let fresh = entry_map(&after);
            cache.merge(owner(0xbb), 1, fresh.clone()).await;

            let all = cache.read().await;
            prop_assert_eq!(all.len(), 1);
            prop_assert_eq!(all.get(&1).cloned().unwrap_or_default(), fresh);
            Ok(())
        })?;
    }
}
