//! Monetary amounts using decimal arithmetic.
//!
//! All cart and checkout math goes through [`Price`] so binary floating
//! point never touches an order total.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes supported by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    TRY,
    USD,
    EUR,
}

impl CurrencyCode {
    /// The ISO code as a string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TRY => "TRY",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }
}

/// An amount of money in a specific currency.
///
/// Arithmetic helpers keep the left-hand side's currency; the storefront
/// operates in a single configured currency, and mixing currencies is a
/// programming error caught by `debug_assert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., lira, not kuruş).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// True if the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Sum of two prices in the same currency.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch");
        Self::new(self.amount + other.amount, self.currency)
    }

    /// Difference clamped at zero (used for "remaining until free shipping").
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch");
        let diff = self.amount - other.amount;
        Self::new(diff.max(Decimal::ZERO), self.currency)
    }

    /// Line total for a quantity of this unit price.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency)
    }

    /// True if this price is at least `other` (same currency).
    #[must_use]
    pub fn at_least(self, other: Self) -> bool {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch");
        self.amount >= other.amount
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.round_dp(2), self.currency.code())
    }
}
