//! Conversion between base units (wei) and decimal display units (ether).
//!
//! Display strings are normalized on the way out: no trailing fractional
//! zeros and no trailing dot, so `to_base_units(&from_base_units(x)) == x`
//! for every `U256`.

use alloy::primitives::U256;
use thiserror::Error;

pub const DECIMALS: usize = 18;

const SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,
    #[error("{0:?} is not a decimal amount")]
    Malformed(String),
    #[error("{0:?} has more than {DECIMALS} fractional digits")]
    TooPrecise(String),
    #[error("{0:?} does not fit in 256 bits")]
    Overflow(String),
}

pub fn to_base_units(display: &str) -> Result<U256, UnitsError> {
    let s = display.trim();
    if s.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (int, frac) = s.split_once('.').unwrap_or((s, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
        return Err(UnitsError::Malformed(s.to_string()));
    }
    if frac.len() > DECIMALS {
        return Err(UnitsError::TooPrecise(s.to_string()));
    }

    let overflow = || UnitsError::Overflow(s.to_string());
    let whole = if int.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int, 10).map_err(|_| overflow())?
    };
    let fraction = {
        let padded = format!("{:0<width$}", frac, width = DECIMALS);
        U256::from_str_radix(&padded, 10).map_err(|_| overflow())?
    };
    whole
        .checked_mul(SCALE)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(overflow)
}

pub fn from_base_units(base: U256) -> String {
    let whole = base / SCALE;
    let fraction = base % SCALE;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = DECIMALS);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
