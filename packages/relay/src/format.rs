//! Message Formatting
//!
//! Pure helpers shared by the handlers: operation code labels, vault name
//! cleanup, number rendering, explorer links and controller slot names.

use std::borrow::Cow;
use std::sync::LazyLock;

use alloy::primitives::utils::format_units;
use alloy::primitives::{keccak256, Address, B256, U256};
use tracing::warn;

/// Time-lock delay quoted in announcement texts
pub const TIME_LOCK_DELAY_TEXT: &str = "after 48 hours";

/// Rendered when a ratio is announced with a zero denominator
pub const UNDEFINED_RATIO: &str = "undefined (zero denominator)";

const OP_CODE_LABELS: [&str; 23] = [
    "Governance",
    "Dao",
    "FeeRewardForwarder",
    "Bookkeeper",
    "MintHelper",
    "RewardToken",
    "FundToken",
    "PsVault",
    "Fund",
    "PsRatio",
    "FundRatio",
    "Tokens transfer from Controller",
    "Token transfer from Strategy",
    "Token transfer from FundKeeper",
    "TetuProxyUpdate",
    "StrategyUpgrade",
    "Mint",
    "Announcer",
    "ZeroPlaceholder",
    "VaultController",
    "RewardBoostDuration",
    "RewardRatioWithoutBoost",
    "VaultStop",
];

/// Label of a time-lock operation code; never fails
pub fn op_code_label(code: u8) -> Cow<'static, str> {
    match OP_CODE_LABELS.get(code as usize) {
        Some(label) => Cow::Borrowed(label),
        None => Cow::Owned(format!("Unknown({})", code)),
    }
}

const SLOT_NAMES: [&str; 16] = [
    "governance",
    "dao",
    "feeRewardForwarder",
    "bookkeeper",
    "mintHelper",
    "rewardToken",
    "fundToken",
    "psVault",
    "fund",
    "distributor",
    "announcer",
    "vaultController",
    "psNumerator",
    "psDenominator",
    "fundNumerator",
    "fundDenominator",
];

/// Controller slot names keyed by the hash the controller logs
static SLOT_HASHES: LazyLock<Vec<(B256, &'static str)>> = LazyLock::new(|| {
    SLOT_NAMES
        .iter()
        .map(|name| (keccak256(name.as_bytes()), *name))
        .collect()
});

/// Name of a controller slot from its hash; unknown hashes render as hex
pub fn slot_name(hash: &B256) -> String {
    SLOT_HASHES
        .iter()
        .find(|(h, _)| h == hash)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("{:#x}", hash))
}

/// Strip platform prefixes from a vault name
///
/// `TETU_SWAP_*` names are kept. Otherwise the `TETU_IRON_LOAN_`, `TETU_AAVE_`
/// and `TETU_` prefixes are removed, repeatedly, until nothing changes.
pub fn format_vault_name(name: &str) -> String {
    let mut current = name;
    loop {
        let next = strip_vault_prefix(current);
        if next == current {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_vault_prefix(name: &str) -> &str {
    if name.starts_with("TETU_SWAP_") {
        return name;
    }
    let name = name.strip_prefix("TETU_IRON_LOAN_").unwrap_or(name);
    let name = name.strip_prefix("TETU_AAVE_").unwrap_or(name);
    if name.starts_with("TETU_SWAP_") {
        return name;
    }
    name.strip_prefix("TETU_").unwrap_or(name)
}

/// Convert a raw token amount into a float with `decimals` places
pub fn units_to_f64(amount: U256, decimals: u8) -> f64 {
    match format_units(amount, decimals) {
        Ok(text) => text.parse().unwrap_or(0.0),
        Err(e) => {
            warn!("Cannot scale amount {} by {} decimals: {}", amount, decimals, e);
            0.0
        }
    }
}

/// Render a value rounded to an integer with thousands separators
///
/// Rounds half away from zero, e.g. `2000102.5` becomes `"2,000,103"`.
pub fn format_integer(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞".to_string() } else { "-∞".to_string() };
    }

    let rounded = value.round();
    let grouped = group_digits(&format!("{:.0}", rounded.abs()));
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Insert a comma between every group of three digits
pub fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Exact raw integer amount with thousands separators
pub fn format_raw_amount(amount: U256) -> String {
    group_digits(&amount.to_string())
}

/// Token amount rendered with its decimals, rounded and grouped
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    format_integer(units_to_f64(amount, decimals))
}

/// Numerator over denominator as a float
pub fn format_ratio(numerator: U256, denominator: U256) -> String {
    if denominator.is_zero() {
        return UNDEFINED_RATIO.to_string();
    }
    let ratio = units_to_f64(numerator, 0) / units_to_f64(denominator, 0);
    format!("{}", ratio)
}

/// Short `0x1234...abcd` form of an address
pub fn shorten_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Markdown link to an address on the block explorer
///
/// # Arguments
/// * `scan_url` - Explorer web root
/// * `address` - Target address, rendered checksummed in the URL
/// * `label` - Link text; the shortened address when `None`
pub fn address_link(scan_url: &str, address: &Address, label: Option<&str>) -> String {
    let text = match label {
        Some(label) => label.to_string(),
        None => shorten_address(address),
    };
    format!("[{}]({}/address/{})", text, scan_url, address.to_checksum(None))
}

/// Explorer URL of a transaction
pub fn tx_url(scan_url: &str, transaction_hash: &str) -> String {
    format!("{}/tx/{}", scan_url, transaction_hash)
}

/// Emoji matching the size of a strategy earning
pub fn earned_emoji(usd: f64) -> &'static str {
    if usd < 10.0 {
        ":smirk:"
    } else if usd < 100.0 {
        ":relaxed:"
    } else {
        ":exploding_head:"
    }
}
