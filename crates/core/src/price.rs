//! Fixed-point product price.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Number of fractional digits every price is stored with.
pub const PRICE_SCALE: u32 = 2;

/// Maximum number of significant digits (integer + fractional) a price may carry.
pub const PRICE_MAX_DIGITS: u32 = 10;

/// A non-negative monetary amount with exactly two fractional digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Validate and normalize a decimal amount.
    ///
    /// Rejects negative amounts, more than two fractional digits and more than
    /// ten digits in total. Accepted amounts are rescaled so `2.5` is held as `2.50`.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("price must not be negative"));
        }

        let normalized = amount.normalize();
        if normalized.scale() > PRICE_SCALE {
            return Err(DomainError::validation(format!(
                "price must have at most {PRICE_SCALE} decimal places"
            )));
        }

        let mut scaled = normalized;
        scaled.rescale(PRICE_SCALE);
        let integer_digits = scaled.trunc().abs().to_string().trim_start_matches('0').len() as u32;
        if integer_digits > PRICE_MAX_DIGITS - PRICE_SCALE {
            return Err(DomainError::validation(format!(
                "price must have at most {PRICE_MAX_DIGITS} digits"
            )));
        }

        Ok(Self(scaled))
    }

    /// Parse a textual amount (surrounding whitespace is ignored).
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::validation("price is required"));
        }
        let amount = Decimal::from_str(raw)
            .map_err(|_| DomainError::validation("price must be a decimal number"))?;
        Self::new(amount)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Total for `quantity` units at this price.
    pub fn times(&self, quantity: u32) -> Decimal {
        self.0 * Decimal::from(quantity)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self {
        value.0
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
