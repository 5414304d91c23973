use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Number of decimal places between the ledger's base unit and the display unit.
pub const DISPLAY_DECIMALS: u32 = 18;

pub const BASE_UNITS_PER_DISPLAY_UNIT: u128 = 10u128.pow(DISPLAY_DECIMALS);

/// Fixed payment attached to every ticket purchase.
pub const TICKET_PRICE: Amount = Amount::from_display_units(1);

/// An amount of the ledger's native currency, held in base units.
///
/// `Display` renders it in display units with trailing zeros trimmed, so
/// `1_500_000_000_000_000_000` base units print as `1.5`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(base: u128) -> Self {
        Self(base)
    }

    pub const fn from_display_units(display: u64) -> Self {
        Self(display as u128 * BASE_UNITS_PER_DISPLAY_UNIT)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    pub fn to_display(self) -> String {
        base_to_display(self.0)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

pub fn base_to_display(base: u128) -> String {
    let whole = base / BASE_UNITS_PER_DISPLAY_UNIT;
    let fraction = base % BASE_UNITS_PER_DISPLAY_UNIT;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}", width = DISPLAY_DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Parses a display-unit string such as `"2"` or `"0.25"` into base units.
///
/// Returns `None` for negative, malformed, or over-precise input (more than
/// [`DISPLAY_DECIMALS`] fractional digits) and on overflow.
pub fn display_to_base(display: &str) -> Option<u128> {
    let trimmed = display.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    if fraction.len() > DISPLAY_DECIMALS as usize {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: u128 = if fraction.is_empty() {
        0
    } else {
        let scale = 10u128.pow(DISPLAY_DECIMALS - fraction.len() as u32);
        fraction.parse::<u128>().ok()? * scale
    };
    whole
        .checked_mul(BASE_UNITS_PER_DISPLAY_UNIT)?
        .checked_add(fraction)
}
