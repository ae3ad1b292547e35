//! Amount and identifier codec
//!
//! Fixed-point conversion between decimal strings and integer base units,
//! and packing of 20-byte EVM addresses into the 32-byte identifiers used by
//! cross-chain transfer messages. Amounts move between components as `U256`
//! base units only; the 2-decimal display form is for humans.

use alloy_primitives::{Address, B256, U256};

use crate::types::{EngineError, EngineResult};

/// Decimals of the stable reference asset
pub const STABLE_DECIMALS: u8 = 6;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Parse a decimal amount into base units at `decimals` precision.
///
/// Digits beyond `decimals` are floored away. Rejects empty, signed,
/// non-numeric, exponent-notation and zero input.
pub fn parse_units(amount: &str, decimals: u8) -> EngineResult<U256> {
    let units = parse_units_allow_zero(amount, decimals)?;
    if units.is_zero() {
        return Err(EngineError::InvalidAmount(format!(
            "{} is below the smallest unit",
            amount.trim()
        )));
    }
    Ok(units)
}

/// `parse_units` for bounds rather than transfer amounts, where zero is a
/// legal value (a minimum output of "0" disables slippage protection).
pub fn parse_units_allow_zero(amount: &str, decimals: u8) -> EngineResult<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount("amount is empty".into()));
    }
    if trimmed.starts_with('-') {
        return Err(EngineError::InvalidAmount(format!("{} is not positive", trimmed)));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(EngineError::InvalidAmount(format!("{} is not a decimal number", trimmed)));
    }

    let overflow = || EngineError::InvalidAmount(format!("{} is too large", trimmed));
    let scale = U256::from(10u64).pow(U256::from(decimals));

    let whole_units = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| overflow())?
    };

    let mut fraction_digits: String = fraction.chars().take(decimals as usize).collect();
    while fraction_digits.len() < decimals as usize {
        fraction_digits.push('0');
    }
    let fraction_units = if fraction_digits.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&fraction_digits, 10).map_err(|_| overflow())?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(overflow)
}

/// Decimal string of the stable asset to 6-decimal base units (floored)
pub fn to_base_units(amount: &str) -> EngineResult<U256> {
    parse_units(amount, STABLE_DECIMALS)
}

/// Lenient variant for user-typed amounts: strips `$`, `,` and whitespace
pub fn parse_user_amount(raw: &str, decimals: u8) -> EngineResult<U256> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    parse_units(&cleaned, decimals)
}

/// Stable-asset base units to a display string with exactly 2 fractional
/// digits, rounding half up at the cent.
pub fn to_decimal_string(units: U256) -> String {
    // 10^6 base units per whole, 10^4 per cent
    let cents = units.saturating_add(U256::from(5_000u64)) / U256::from(10_000u64);
    let whole = cents / U256::from(100u64);
    let frac = u64::try_from(cents % U256::from(100u64)).unwrap_or_default();
    format!("{}.{:02}", whole, frac)
}

/// Full-precision rendering, trailing zeros trimmed (for logs and API echo)
pub fn format_units(units: U256, decimals: u8) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = units / scale;
    let rem = units % scale;
    if rem.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", rem.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Left-pad a hex-encoded native address to a 32-byte identifier.
///
/// Oversized input is an error; nothing is ever truncated.
pub fn pack_identifier(native_address: &str) -> EngineResult<B256> {
    let hex_str = native_address.trim();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)
        .map_err(|e| EngineError::InvalidAddress(format!("{}: {}", native_address, e)))?;

    if bytes.is_empty() {
        return Err(EngineError::InvalidAddress("address is empty".into()));
    }
    if bytes.len() > 32 {
        return Err(EngineError::InvalidAddress(format!(
            "{} is {} bytes, identifiers hold at most 32",
            native_address,
            bytes.len()
        )));
    }

    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(B256::from(out))
}

/// Infallible packing for an already-parsed EVM address
pub fn address_to_identifier(address: Address) -> B256 {
    address.into_word()
}

/// Inverse of `address_to_identifier`; the high 12 bytes must be zero
pub fn identifier_to_address(identifier: B256) -> EngineResult<Address> {
    if identifier[..12].iter().any(|b| *b != 0) {
        return Err(EngineError::InvalidAddress(format!(
            "{} does not hold a 20-byte address",
            identifier
        )));
    }
    Ok(Address::from_word(identifier))
}

/// Minimum acceptable output for an expected amount under `slippage_bps`
pub fn min_output(expected: U256, slippage_bps: u16) -> U256 {
    let bps = u64::from(slippage_bps).min(BPS_DENOMINATOR);
    expected.saturating_mul(U256::from(BPS_DENOMINATOR - bps)) / U256::from(BPS_DENOMINATOR)
}

/// Parse an integer quantity given either as decimal or `0x` hex
pub fn parse_quantity(raw: &str) -> EngineResult<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some("") => Ok(U256::ZERO),
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None if raw.is_empty() => Ok(U256::ZERO),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|_| EngineError::InvalidAmount(format!("{} is not an integer quantity", raw)))
}

/// `0x`-prefixed lowercase hex
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}
