// Property-based tests for address normalization.

use proptest::prelude::*;
use shared::Address;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any casing, any prefix spelling and any surrounding whitespace of
    /// the same 40 hex digits normalize to the same address, rendered
    /// lowercase with a 0x prefix.
    #[test]
    fn prop_casing_and_prefix_never_matter(hex in "[0-9a-fA-F]{40}") {
        let plain = Address::normalize(Some(&hex));
        let prefixed = Address::normalize(Some(&format!("0x{}", hex)));
        let upper = Address::normalize(Some(&format!("0X{}", hex.to_uppercase())));
        let padded = Address::normalize(Some(&format!("  {}\t", hex)));

        prop_assert_eq!(plain, prefixed);
        prop_assert_eq!(plain, upper);
        prop_assert_eq!(plain, padded);
        prop_assert_eq!(plain.to_hex(), format!("0x{}", hex.to_lowercase()));
    }

    /// Normalization is idempotent: feeding the canonical form back in
    /// changes nothing, whatever the original input was.
    #[test]
    fn prop_normalize_is_idempotent(input in ".{0,64}") {
        let once = Address::normalize(Some(&input));
        let twice = Address::normalize(Some(&once.to_hex()));
        prop_assert_eq!(once, twice);
    }

    /// Hex of the wrong length is rejected wholesale, never truncated or
    /// padded into an address.
    #[test]
    fn prop_wrong_length_hex_is_zero(hex in "[0-9a-f]{1,39}|[0-9a-f]{41,80}") {
        prop_assert!(Address::normalize(Some(&hex)).is_zero());
    }

    /// A single non-hex character anywhere poisons the whole input.
    #[test]
    fn prop_non_hex_digit_is_zero(prefix in "[0-9a-f]{0,39}", bad in "[g-z]") {
        let mut input = prefix;
        input.push_str(&bad);
        while input.len() < 40 {
            input.push('0');
        }
        let input: String = input.chars().take(40).collect();

        prop_assert!(Address::normalize(Some(&input)).is_zero());
    }
}
