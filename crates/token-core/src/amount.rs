//! Human-readable amounts and their integer minor-unit form.
//!
//! Amounts are parsed from decimal text and never pass through floating
//! point. Conversion to minor units truncates toward zero, so
//! `floor(amount × 10^decimals)` holds exactly for every input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// A non-negative decimal amount as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiAmount {
    /// Integer digits, no leading zeros ("0" for zero).
    whole: String,
    /// Fraction digits, no trailing zeros.
    fraction: String,
}

impl UiAmount {
    /// Parse `123`, `1.5`, `.25` or `10.`; anything else is rejected.
    pub fn parse(input: &str) -> Result<Self, TokenError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(TokenError::validation("amount", "is required"));
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(TokenError::validation("amount", format!("'{s}' is not a number")));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(TokenError::validation("amount", format!("'{s}' is not a number")));
        }

        let whole = whole.trim_start_matches('0');
        let fraction = fraction.trim_end_matches('0');
        Ok(Self {
            whole: if whole.is_empty() { "0".into() } else { whole.into() },
            fraction: fraction.into(),
        })
    }

    pub fn is_zero(&self) -> bool {
        self.whole == "0" && self.fraction.is_empty()
    }

    /// `floor(self × 10^decimals)` as a `u64`.
    pub fn to_raw(&self, decimals: u8) -> Result<u64, TokenError> {
        let overflow = || {
            TokenError::validation(
                "amount",
                format!("{self} is too large for {decimals} decimals"),
            )
        };

        let scale = 10u128.checked_pow(u32::from(decimals)).ok_or_else(overflow)?;

        let mut whole: u128 = 0;
        for digit in self.whole.bytes() {
            whole = whole
                .checked_mul(10)
                .and_then(|v| v.checked_add(u128::from(digit - b'0')))
                .ok_or_else(overflow)?;
        }

        // Only the first `decimals` fraction digits survive the floor.
        let mut fraction: u128 = 0;
        let kept = self.fraction.bytes().take(decimals as usize);
        let mut kept_len = 0u32;
        for digit in kept {
            fraction = fraction * 10 + u128::from(digit - b'0');
            kept_len += 1;
        }
        fraction *= 10u128.pow(u32::from(decimals) - kept_len);

        let raw = whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(overflow)?;
        u64::try_from(raw).map_err(|_| overflow())
    }
}

impl FromStr for UiAmount {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction.is_empty() {
            f.write_str(&self.whole)
        } else {
            write!(f, "{}.{}", self.whole, self.fraction)
        }
    }
}

/// An integer amount of minor units together with its scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A u64 has at most 20 digits, so anything past 10^38 is all fraction.
        let Some(scale) = 10u128.checked_pow(u32::from(self.decimals)) else {
            return write!(f, "0.{:0>width$}", self.raw, width = self.decimals as usize);
        };
        let raw = u128::from(self.raw);
        let whole = raw / scale;
        let fraction = raw % scale;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:0width$}", width = self.decimals as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str, decimals: u8) -> u64 {
        UiAmount::parse(s).unwrap().to_raw(decimals).unwrap()
    }

    #[test]
    fn integer_amounts_scale_exactly() {
        assert_eq!(raw("1000", 9), 1_000_000_000_000);
        assert_eq!(raw("100", 0), 100);
        assert_eq!(raw("0", 6), 0);
    }

    #[test]
    fn fractions_are_floored() {
        assert_eq!(raw("1.5", 6), 1_500_000);
        assert_eq!(raw("0.1234567", 6), 123_456);
        assert_eq!(raw("2.999", 0), 2);
        assert_eq!(raw(".25", 2), 25);
        assert_eq!(raw("10.", 1), 100);
    }

    #[test]
    fn sub_unit_amounts_floor_to_zero() {
        assert_eq!(raw("0.0000001", 6), 0);
    }

    #[test]
    fn eighteen_decimals_fit_when_small() {
        assert_eq!(raw("1", 18), 1_000_000_000_000_000_000);
        assert_eq!(raw("18.446744073709551615", 18), u64::MAX);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let amount = UiAmount::parse("18.446744073709551616").unwrap();
        assert!(matches!(
            amount.to_raw(18),
            Err(TokenError::Validation { .. })
        ));
        let huge = UiAmount::parse("99999999999999999999999999999999999999999").unwrap();
        assert!(huge.to_raw(0).is_err());
    }

    #[test]
    fn rejects_non_numbers() {
        for bad in ["", " ", "abc", "-1", "1e3", "1.2.3", ".", "+5", "NaN", "inf"] {
            assert!(UiAmount::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn display_is_normalized() {
        assert_eq!(UiAmount::parse("007.500").unwrap().to_string(), "7.5");
        assert_eq!(UiAmount::parse("0.0").unwrap().to_string(), "0");
        assert!(UiAmount::parse("0.000").unwrap().is_zero());
    }

    #[test]
    fn token_amount_display() {
        assert_eq!(TokenAmount::new(1_000_000_000_000, 9).to_string(), "1000");
        assert_eq!(TokenAmount::new(1_500_000, 6).to_string(), "1.5");
        assert_eq!(TokenAmount::new(5, 3).to_string(), "0.005");
        assert_eq!(TokenAmount::new(42, 0).to_string(), "42");
        assert_eq!(TokenAmount::new(u64::MAX, 18).to_string(), "18.446744073709551615");
    }
}
