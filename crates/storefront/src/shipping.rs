//! Shipping cost quotes.
//!
//! The pricing function is an external collaborator: the thresholds and
//! per-option costs are server-configured, and this module only evaluates
//! them. [`TableShippingCalculator`] is the production implementation,
//! built from fetched [`ShippingSettings`]; checkout consumes the
//! [`ShippingCalculator`] trait so tests can fix the table.

use serde::{Deserialize, Serialize};

use solera_core::Price;

/// One shipping option as configured server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: String,
    pub name: String,
    pub cost: Price,
    /// Human-readable delivery estimate, e.g. `"2-4"` days.
    pub estimated_days: String,
    pub description: String,
    /// Options can be switched off server-side without being deleted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Server-configured shipping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingSettings {
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Price,
    pub options: Vec<ShippingOption>,
}

/// A quote for the current subtotal and selected option.
///
/// Derived, never persisted; recomputed whenever the subtotal or the
/// selected option changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingCalculation {
    pub shipping_cost: Price,
    pub is_free_shipping: bool,
    pub total: Price,
    pub available_options: Vec<ShippingOption>,
}

/// Pure quote evaluation; side-effect-free.
pub trait ShippingCalculator: Send + Sync {
    /// Quote the given subtotal with the given option selected.
    ///
    /// An unknown or disabled `option_id` falls back to the first available
    /// option; with no options configured, shipping is quoted at zero.
    fn calculate(&self, subtotal: Price, option_id: &str) -> ShippingCalculation;

    /// How much more the subtotal needs before shipping is free (zero once
    /// the threshold is reached).
    fn free_shipping_remaining(&self, subtotal: Price) -> Price;
}

/// Calculator backed by a fetched [`ShippingSettings`] table.
#[derive(Debug, Clone)]
pub struct TableShippingCalculator {
    settings: ShippingSettings,
}

impl TableShippingCalculator {
    #[must_use]
    pub const fn new(settings: ShippingSettings) -> Self {
        Self { settings }
    }
}

impl ShippingCalculator for TableShippingCalculator {
    fn calculate(&self, subtotal: Price, option_id: &str) -> ShippingCalculation {
        let available: Vec<ShippingOption> = self
            .settings
            .options
            .iter()
            .filter(|o| o.enabled)
            .cloned()
            .collect();

        let selected_cost = available
            .iter()
            .find(|o| o.id == option_id)
            .or_else(|| available.first())
            .map_or_else(|| Price::zero(subtotal.currency), |o| o.cost);

        let is_free_shipping = subtotal.at_least(self.settings.free_shipping_threshold);
        let shipping_cost = if is_free_shipping {
            Price::zero(subtotal.currency)
        } else {
            selected_cost
        };

        ShippingCalculation {
            shipping_cost,
            is_free_shipping,
            total: subtotal.add(shipping_cost),
            available_options: available,
        }
    }

    fn free_shipping_remaining(&self, subtotal: Price) -> Price {
        self.settings
            .free_shipping_threshold
            .saturating_sub(subtotal)
    }
}
