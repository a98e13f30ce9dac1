// Property-based tests for raw-to-display unit conversion.

use ethereum_types::U256;
use proptest::prelude::*;
use shared::format_units;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The rendered string matches exact native-integer arithmetic for
    /// every value that fits in a u128: whole part in full, fraction with
    /// trailing zeros trimmed, no scientific notation anywhere.
    #[test]
    fn prop_format_matches_integer_arithmetic(
        value in any::<u128>(),
        decimals in 0u8..=30,
    ) {
        let rendered = format_units(U256::from(value), decimals);

        let divisor = 10u128.pow(decimals as u32);
        let whole = value / divisor;
        let frac = value % divisor;

        let expected = if frac == 0 {
            whole.to_string()
        } else {
            let mut frac_str = format!("{:0>width$}", frac, width = decimals as usize);
            while frac_str.ends_with('0') {
                frac_str.pop();
            }
            format!("{}.{}", whole, frac_str)
        };

        prop_assert_eq!(rendered, expected);
    }

    /// Zero renders as a bare "0" for any decimal count, including counts
    /// where 10^decimals no longer fits in 256 bits.
    #[test]
    fn prop_zero_is_always_bare(decimals in 0u8..=100) {
        prop_assert_eq!(format_units(U256::zero(), decimals), "0");
    }
}
