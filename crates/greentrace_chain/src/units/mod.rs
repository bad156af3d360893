//! # Token Amounts
//!
//! **NO FLOATING POINT FOR ON-CHAIN AMOUNTS**
//!
//! Registry amounts (carbon reduction, fees, audited values) are `uint256`
//! fixed-point values scaled by `10^decimals` (18 for every token the
//! registry uses). [`TokenAmount`] keeps the raw integer and the scale, and
//! only produces a decimal string when displayed.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Scale used by the registry tokens.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Largest scale that still fits a `u128` multiplier.
pub const MAX_DECIMALS: u8 = 38;

/// Fixed-point token amount.
///
/// Internally stores `value * 10^decimals` as a u128.
///
/// # Range
///
/// - Minimum: 0
/// - Maximum: `u128::MAX / 10^decimals` whole units
///
/// # Example
///
/// ```rust,ignore
/// let fee = TokenAmount::from_raw(1_500_000_000_000_000_000, 18);
/// assert_eq!(fee.to_string(), "1.500000000000000000");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    #[serde(with = "raw_string")]
    raw: u128,
    decimals: u8,
}

impl TokenAmount {
    /// Zero with the default scale.
    pub const ZERO: Self = Self {
        raw: 0,
        decimals: DEFAULT_DECIMALS,
    };

    /// Creates from a raw scaled value (no conversion).
    ///
    /// Scales above [`MAX_DECIMALS`] are clamped.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u128, decimals: u8) -> Self {
        let decimals = if decimals > MAX_DECIMALS {
            MAX_DECIMALS
        } else {
            decimals
        };
        Self { raw, decimals }
    }

    /// Creates from a whole number of units.
    ///
    /// Returns `None` if the scaled value overflows.
    #[inline]
    #[must_use]
    pub fn from_whole(whole: u128, decimals: u8) -> Option<Self> {
        let amount = Self::from_raw(0, decimals);
        whole
            .checked_mul(amount.multiplier())
            .map(|raw| Self::from_raw(raw, decimals))
    }

    /// Converts an on-chain `uint256`.
    ///
    /// Returns `None` if the value does not fit in a u128.
    #[must_use]
    pub fn from_u256(value: U256, decimals: u8) -> Option<Self> {
        u128::try_from(value)
            .ok()
            .map(|raw| Self::from_raw(raw, decimals))
    }

    /// Returns the raw scaled value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u128 {
        self.raw
    }

    /// Returns the scale.
    #[inline]
    #[must_use]
    pub const fn decimals(self) -> u8 {
        self.decimals
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u128 {
        self.raw / self.multiplier()
    }

    /// Returns the fractional part (0 to 10^decimals - 1).
    #[inline]
    #[must_use]
    pub const fn fraction(self) -> u128 {
        self.raw % self.multiplier()
    }

    /// Returns true if zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.raw == 0
    }

    /// Saturating addition. Amounts of different scale keep the left scale
    /// and take the right raw value unchanged.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self {
            raw: self.raw.saturating_add(rhs.raw),
            decimals: self.decimals,
        }
    }

    #[inline]
    const fn multiplier(self) -> u128 {
        10u128.pow(self.decimals as u32)
    }
}

impl Default for TokenAmount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({self})")
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        write!(
            f,
            "{}.{:0width$}",
            self.whole(),
            self.fraction(),
            width = usize::from(self.decimals)
        )
    }
}

/// u128 does not survive every JSON reader, so the raw value is stored as a string.
mod raw_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&raw.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<u128>().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversion_divides_by_unit_scale() {
        let amount = TokenAmount::from_raw(1_500_000_000_000_000_000, 18);
        assert_eq!(amount.whole(), 1);
        assert_eq!(amount.fraction(), 500_000_000_000_000_000);
        assert_eq!(amount.to_string(), "1.500000000000000000");
    }

    #[test]
    fn test_small_scales() {
        assert_eq!(TokenAmount::from_raw(1234, 2).to_string(), "12.34");
        assert_eq!(TokenAmount::from_raw(5, 0).to_string(), "5");
        assert_eq!(TokenAmount::from_whole(3, 6).unwrap().raw(), 3_000_000);
    }

    #[test]
    fn test_u256_overflow_is_rejected() {
        assert!(TokenAmount::from_u256(U256::MAX, 18).is_none());
        let fits = TokenAmount::from_u256(U256::from(42u64), 18).unwrap();
        assert_eq!(fits.raw(), 42);
    }

    #[test]
    fn test_excessive_scale_is_clamped() {
        assert_eq!(TokenAmount::from_raw(1, 60).decimals(), MAX_DECIMALS);
    }
}
