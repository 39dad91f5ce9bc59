//! Unit scaling and display helpers used by call builders.

use ethers_core::types::U256;

use crate::args::parse_uint;
use crate::{CabalError, Result};

/// Scale a human-entered amount by `10^magnitude`.
///
/// Accepts decimal input (`"1.5"`, `"20"`) or `0x` hex integers. Fractional
/// digits beyond `magnitude` are rounded half-up.
pub fn scale_magnitude(value: &str, magnitude: u32) -> Result<U256> {
    let value = value.trim();
    let invalid = || CabalError::InvalidNumber(value.to_string());

    let scale = U256::exp10(magnitude as usize);

    if value.starts_with("0x") {
        let integer = parse_uint(value).map_err(|_| invalid())?;
        return integer.checked_mul(scale).ok_or_else(invalid);
    }

    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !digits_only(whole) || !digits_only(fraction) {
        return Err(invalid());
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid())?
    };
    let mut scaled = whole.checked_mul(scale).ok_or_else(invalid)?;

    let magnitude = magnitude as usize;
    let (kept, dropped) = if fraction.len() > magnitude {
        fraction.split_at(magnitude)
    } else {
        (fraction, "")
    };

    if !kept.is_empty() {
        let padding = magnitude - kept.len();
        let kept = U256::from_dec_str(kept).map_err(|_| invalid())?;
        scaled = scaled
            .checked_add(kept * U256::exp10(padding))
            .ok_or_else(invalid)?;
    }

    if dropped.bytes().next().map_or(false, |d| d >= b'5') {
        scaled = scaled.checked_add(U256::one()).ok_or_else(invalid)?;
    }

    Ok(scaled)
}

/// `0x1234...abcd`
pub fn truncate_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Format a wei amount as ether with trailing zeros trimmed.
pub fn format_ether(wei: U256) -> String {
    let scale = U256::exp10(18);
    let whole = wei / scale;
    let fraction = wei % scale;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>18}", fraction.to_string());
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
