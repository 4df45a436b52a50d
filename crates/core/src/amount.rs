//! Amount - Integer base-unit wrapper for collateral and premium amounts
//!
//! Every balance in HedgePool is counted in the token's smallest unit
//! (satoshis for sBTC). Amounts are unsigned, so negativity is ruled out by
//! the type; the remaining hazards are overflow and underflow, which every
//! arithmetic helper reports instead of wrapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when doing arithmetic on amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount overflow: {lhs} + {rhs}")]
    Overflow { lhs: u64, rhs: u64 },

    #[error("Amount underflow: {lhs} - {rhs}")]
    Underflow { lhs: u64, rhs: u64 },

    #[error("Amount overflow: {value} * {numerator} / {denominator}")]
    MulOverflow {
        value: u64,
        numerator: u64,
        denominator: u64,
    },

    #[error("Division by zero")]
    DivisionByZero,
}

/// A non-negative amount of a token in base units.
///
/// # Example
/// ```
/// use hedgepool_core::Amount;
///
/// let a = Amount::new(600);
/// let b = Amount::new(400);
/// assert_eq!(a.checked_add(b).unwrap(), Amount::new(1_000));
///
/// // Going below zero is an error, not a wrap
/// assert!(b.checked_sub(a).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the inner base-unit value
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(AmountError::Overflow {
                lhs: self.0,
                rhs: other.0,
            })
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(AmountError::Underflow {
                lhs: self.0,
                rhs: other.0,
            })
    }

    /// Subtract, clamping at zero
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `self * numerator / denominator`, rounded down, computed in 128 bits.
    pub fn mul_div_floor(self, numerator: u64, denominator: u64) -> Result<Amount, AmountError> {
        let wide = self.mul_div_wide(numerator, denominator)?;
        u64::try_from(wide).map(Amount).map_err(|_| AmountError::MulOverflow {
            value: self.0,
            numerator,
            denominator,
        })
    }

    /// Like [`Amount::mul_div_floor`], but clamped to `cap` before narrowing,
    /// so a quotient beyond `u64` still yields `cap`. The flag reports
    /// whether the clamp applied.
    pub fn mul_div_floor_capped(
        self,
        numerator: u64,
        denominator: u64,
        cap: Amount,
    ) -> Result<(Amount, bool), AmountError> {
        let wide = self.mul_div_wide(numerator, denominator)?;
        if wide > u128::from(cap.0) {
            return Ok((cap, true));
        }
        let value = u64::try_from(wide).map_err(|_| AmountError::MulOverflow {
            value: self.0,
            numerator,
            denominator,
        })?;
        Ok((Amount(value), false))
    }

    fn mul_div_wide(self, numerator: u64, denominator: u64) -> Result<u128, AmountError> {
        if denominator == 0 {
            return Err(AmountError::DivisionByZero);
        }
        // u64 * u64 always fits in u128
        Ok(u128::from(self.0) * u128::from(numerator) / u128::from(denominator))
    }

    /// Checked sum over an iterator of amounts
    pub fn checked_sum<I>(amounts: I) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
