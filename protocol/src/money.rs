//! # Money
//!
//! [`Amount`] is a count of minor currency units (cents). No floating point
//! touches a balance: user input is parsed from decimal strings straight into
//! integers, and every arithmetic step is checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{CURRENCY_CODE, CURRENCY_DECIMALS, MINOR_UNITS_PER_MAJOR};

/// Errors produced when parsing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The input was empty or contained something other than digits and a
    /// single decimal point.
    #[error("invalid amount: {0:?}")]
    Malformed(String),

    /// More fractional digits than the currency supports.
    #[error("amount {0:?} has more than {} decimal places", CURRENCY_DECIMALS)]
    TooPrecise(String),

    /// The value does not fit in 64 bits of minor units.
    #[error("amount {0:?} is too large")]
    Overflow(String),
}

/// A non-negative monetary amount in minor units of [`CURRENCY_CODE`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Wraps a raw minor-unit count.
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Whole currency units, e.g. `from_major(300)` is KSH 300.00.
    pub fn from_major(major: u64) -> Option<Self> {
        major.checked_mul(MINOR_UNITS_PER_MAJOR).map(Self)
    }

    /// The raw minor-unit count.
    pub const fn minor(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Plain decimal rendering without currency or grouping: `"1000.50"`.
    pub fn to_decimal_string(&self) -> String {
        format!(
            "{}.{:0>width$}",
            self.0 / MINOR_UNITS_PER_MAJOR,
            self.0 % MINOR_UNITS_PER_MAJOR,
            width = CURRENCY_DECIMALS as usize
        )
    }
}

impl fmt::Display for Amount {
    /// `KSH 1,000.00`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = (self.0 / MINOR_UNITS_PER_MAJOR).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(
            f,
            "{} {}.{:0>width$}",
            CURRENCY_CODE,
            grouped,
            self.0 % MINOR_UNITS_PER_MAJOR,
            width = CURRENCY_DECIMALS as usize
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `"300"`, `"300.5"` or `"300.50"`. Signs, exponents and
    /// thousands separators are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if frac.len() > CURRENCY_DECIMALS as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountError::Overflow(s.to_string());
        let whole: u64 = whole.parse().map_err(|_| overflow())?;
        let frac_minor: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = CURRENCY_DECIMALS as usize);
            padded.parse().map_err(|_| AmountError::Malformed(s.to_string()))?
        };

        whole
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|m| m.checked_add(frac_minor))
            .map(Amount)
            .ok_or_else(overflow)
    }
}
