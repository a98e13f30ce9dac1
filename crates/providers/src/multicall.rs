//! ABI encoding for batched balance reads through the multicall contract.
//!
//! A batch of `balanceOf` calls is folded into a single `aggregate((address,
//! bytes)[])` invocation so one `eth_call` round trip answers for hundreds
//! of tokens. Results come back positionally in call order.

use ethereum_types::U256;
use std::str::FromStr;

use shared::{Address, Error, Result};

/// Canonical multicall deployment shared by most EVM chains.
pub const MULTICALL_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

// First four bytes of the keccak256 hash of each function signature.
const AGGREGATE_SIG: &str = "252dba42";
const BALANCE_OF_SIG: &str = "70a08231";
const GET_ETH_BALANCE_SIG: &str = "4d2301cc";

const ZEROES: &str = "000000000000000000000000";
const PARAM_COUNT_LEN: usize = 32;
const DATA_PART_LEN: usize = 64;

/// One sub-call inside an aggregate batch.
#[derive(Clone, Debug)]
pub struct Call {
    pub target: Address,
    pub call_data: String,
}

/// `balanceOf(owner)` against an ERC-20 contract.
pub fn erc20_balance_call(token: Address, owner: Address) -> Call {
    Call {
        target: token,
        call_data: format!("{BALANCE_OF_SIG}{ZEROES}{owner:x}"),
    }
}

/// `getEthBalance(owner)` against the multicall contract itself.
///
/// Lets the native coin travel inside the same batch as ERC-20 reads.
pub fn native_balance_call(multicall: Address, owner: Address) -> Call {
    Call {
        target: multicall,
        call_data: format!("{GET_ETH_BALANCE_SIG}{ZEROES}{owner:x}"),
    }
}

/// Encode the calldata for `aggregate(calls)`.
///
/// Every sub-call's data part is padded out to [`DATA_PART_LEN`] bytes, so
/// element offsets advance in fixed strides of five words.
pub fn aggregate(calls: &[Call]) -> String {
    let param_count_len = format!("{PARAM_COUNT_LEN:064x}");
    let param_count = format!("{:064x}", calls.len());

    let aggregated = calls
        .iter()
        .map(|call| {
            let data_len = call.call_data.len() / 2;
            let padding = "0".repeat((DATA_PART_LEN - data_len) * 2);

            format!(
                "{ZEROES}{:x}{DATA_PART_LEN:064x}{data_len:064x}{}{padding}",
                call.target, call.call_data
            )
        })
        .collect::<String>();

    let offsets = (0..(calls.len() * 5))
        .step_by(5)
        .map(|idx| format!("{:064x}", (idx + calls.len()) * 32))
        .collect::<String>();

    format!("{AGGREGATE_SIG}{param_count_len}{param_count}{offsets}{aggregated}")
}

/// Decode the return data of `aggregate` into one `U256` per sub-call.
///
/// `expected` is the number of sub-calls that went out; a response that does
/// not carry exactly that many single-word items fails as a whole rather
/// than yielding partial balances.
pub fn parse_aggregate_result(result: &str, expected: usize) -> Result<Vec<U256>> {
    let body = result.strip_prefix("0x").unwrap_or(result);
    if body.len() % 64 != 0 {
        return Err(Error::Rpc(format!(
            "multicall result length {} is not word aligned",
            body.len()
        )));
    }

    let words = body
        .chars()
        .collect::<Vec<char>>()
        .chunks(64)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<String>>();

    if words.len() < 3 {
        return Err(Error::Rpc(format!(
            "multicall result has only {} words",
            words.len()
        )));
    }

    // Layout: block number, array offset, item count, per-item offsets,
    // then length/value word pairs.
    let count = U256::from_str(&words[2])
        .map_err(|e| Error::Rpc(format!("bad multicall item count: {e}")))?;
    if count != U256::from(expected) {
        return Err(Error::Rpc(format!(
            "multicall returned {count} items, expected {expected}"
        )));
    }

    let values = words
        .iter()
        .skip(expected + 4)
        .step_by(2)
        .take(expected)
        .map(|word| {
            U256::from_str(word).map_err(|e| Error::Rpc(format!("bad balance word {word}: {e}")))
        })
        .collect::<Result<Vec<U256>>>()?;

    if values.len() != expected {
        return Err(Error::Rpc(format!(
            "multicall result truncated after {} of {} items",
            values.len(),
            expected
        )));
    }

    Ok(values)
}
