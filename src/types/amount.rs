//! Token and SOL amounts with safe arithmetic.
//!
//! Token balances use 9 decimal places stored as base units, so a balance
//! can never be negative and fractional presale credits stay exact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places for the token balance
pub const DECIMALS: u32 = 9;

/// One whole token in base units
pub const ONE_TOKEN: u128 = 10_u128.pow(DECIMALS);

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// A token balance in the smallest unit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from raw base units
    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from whole tokens
    #[must_use]
    pub const fn from_tokens(tokens: u64) -> Self {
        Self(tokens as u128 * ONE_TOKEN)
    }

    /// Create from a decimal string such as `"12.5"`
    ///
    /// # Errors
    /// Returns error if the string format is invalid
    pub fn from_decimal_str(s: &str) -> Result<Self, AmountError> {
        let parts: Vec<&str> = s.trim().split('.').collect();

        if parts.len() > 2 || parts[0].is_empty() {
            return Err(AmountError::InvalidFormat);
        }

        let whole: u128 = parts[0].parse().map_err(|_| AmountError::InvalidFormat)?;

        let fractional = if parts.len() == 2 {
            let frac_str = parts[1];
            if frac_str.len() > DECIMALS as usize {
                return Err(AmountError::TooManyDecimals);
            }

            let padded = format!("{:0<width$}", frac_str, width = DECIMALS as usize);
            padded
                .parse::<u128>()
                .map_err(|_| AmountError::InvalidFormat)?
        } else {
            0
        };

        whole
            .checked_mul(ONE_TOKEN)
            .and_then(|w| w.checked_add(fractional))
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Create from a JSON number, rounding to the nearest base unit
    ///
    /// # Errors
    /// Returns error for negative, non-finite, or oversized values
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AmountError::InvalidFormat);
        }
        let scaled = (value * ONE_TOKEN as f64).round();
        if scaled >= u128::MAX as f64 {
            return Err(AmountError::Overflow);
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw = scaled as u128;
        Ok(Self(raw))
    }

    /// Get the raw base unit value
    #[must_use]
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Get the whole token part (truncated)
    #[must_use]
    pub const fn whole_tokens(&self) -> u64 {
        (self.0 / ONE_TOKEN) as u64
    }

    /// Convert to a decimal string representation
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / ONE_TOKEN;
        let frac = self.0 % ONE_TOKEN;

        if frac == 0 {
            format!("{whole}")
        } else {
            let frac_str = format!("{frac:09}");
            let trimmed = frac_str.trim_end_matches('0');
            format!("{whole}.{trimmed}")
        }
    }

    /// Checked subtraction
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Calculate percentage (e.g., 10 = 10%)
    #[must_use]
    pub fn percentage(self, percent: u8) -> Self {
        Self(self.0.saturating_mul(u128::from(percent)) / 100)
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction (floors at 0)
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Check if amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.to_decimal_string())
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tokens", self.to_decimal_string())
    }
}

/// A SOL payment amount in lamports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Lamports(pub u64);

impl Lamports {
    /// Convert a reported SOL amount, rejecting anything that is not a
    /// positive finite number no larger than `cap`.
    ///
    /// # Errors
    /// Returns error if the amount is out of range
    pub fn from_sol(sol: f64, cap: Self) -> Result<Self, AmountError> {
        if !sol.is_finite() || sol <= 0.0 {
            return Err(AmountError::NotPositive);
        }
        let lamports = (sol * LAMPORTS_PER_SOL as f64).round();
        if lamports > cap.0 as f64 {
            return Err(AmountError::AboveCap { cap });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let lamports = lamports as u64;
        if lamports == 0 {
            return Err(AmountError::NotPositive);
        }
        Ok(Self(lamports))
    }

    /// Whole SOL as lamports
    #[must_use]
    pub const fn from_whole_sol(sol: u64) -> Self {
        Self(sol * LAMPORTS_PER_SOL)
    }

    /// True if `self` is within `percent` percent of `expected`
    #[must_use]
    pub fn within_tolerance(self, expected: Self, percent: u8) -> bool {
        let allowed = u128::from(expected.0) * u128::from(percent) / 100;
        u128::from(self.0.abs_diff(expected.0)) <= allowed
    }

    /// Value in SOL, for display
    #[must_use]
    pub fn as_sol(self) -> f64 {
        self.0 as f64 / LAMPORTS_PER_SOL as f64
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SOL", self.as_sol())
    }
}

/// Amount parsing/arithmetic errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AmountError {
    /// Invalid number format
    #[error("invalid amount format")]
    InvalidFormat,
    /// Too many decimal places
    #[error("too many decimal places (max {DECIMALS})")]
    TooManyDecimals,
    /// Arithmetic overflow
    #[error("amount overflow")]
    Overflow,
    /// Zero, negative or non-finite amount
    #[error("amount must be positive")]
    NotPositive,
    /// Amount above the configured sanity bound
    #[error("amount exceeds maximum of {cap}")]
    AboveCap {
        /// The bound that was exceeded
        cap: Lamports,
    },
}
