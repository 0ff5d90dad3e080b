//! Domain types shared between the backend client and the stores.

use serde::{Deserialize, Serialize};

use solera_core::{CartLineId, Email, Price, ProductId, Role, UserId, VariantId};

// =============================================================================
// Identity
// =============================================================================

/// The authenticated identity as reported by the identity provider.
///
/// Carries the token's own claims so a profile can be synthesized when the
/// profile row is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: Email,
    /// Best-effort display name claim, if the provider has one.
    pub display_name: Option<String>,
}

/// Events emitted by the identity provider.
///
/// [`crate::stores::SessionStore::on_auth_change`] is the sole consumer and
/// the sole writer of signed-in state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut,
}

/// Where a profile's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileSource {
    /// Read from the backend profile row.
    Remote,
    /// Synthesized from token claims because the row was missing or
    /// unreadable. Downstream code can surface this degraded state.
    Synthesized,
}

/// The profile rendered for a signed-in user.
///
/// Guaranteed non-null whenever a user is signed in: if the backend row
/// cannot be read, a minimal profile is synthesized from token claims and
/// marked [`ProfileSource::Synthesized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: Email,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub source: ProfileSource,
}

impl Profile {
    /// Build a minimal profile from token claims.
    #[must_use]
    pub fn synthesized(session: &AuthSession) -> Self {
        Self {
            id: session.user_id,
            email: session.email.clone(),
            display_name: session.display_name.clone(),
            phone: None,
            role: Role::Customer,
            source: ProfileSource::Synthesized,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Denormalized product data carried on a cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub price: Price,
    pub images: Vec<String>,
}

/// Denormalized variant data carried on a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub color_name: Option<String>,
    pub size_name: Option<String>,
}

/// One cart line.
///
/// The cart store guarantees at most one line per distinct
/// `(product_id, variant_id)` pair and `quantity >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub product: ProductSnapshot,
    pub variant: Option<VariantSnapshot>,
}

impl CartLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }

    /// True if this line is for the given product/variant pair.
    #[must_use]
    pub fn matches(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// Insert payload for a new cart line; the backend assigns the line ID and
/// returns the denormalized snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct NewCartItem {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

// =============================================================================
// Site configuration
// =============================================================================

/// A node in the header navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub label: String,
    pub href: String,
    #[serde(default)]
    pub children: Vec<MenuNode>,
}

// =============================================================================
// Checkout / orders
// =============================================================================

/// A validated postal address, produced by the checkout forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub email: Email,
    pub phone: String,
    pub line1: String,
    pub city: String,
    pub district: String,
    pub postal_code: Option<String>,
}

/// Supported payment methods.
///
/// Currently a single method: card via the external gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
}

/// The order payload handed to the backend on checkout submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub delivery: Address,
    pub billing: Address,
    pub shipping_option_id: String,
    pub subtotal: Price,
    pub shipping_cost: Price,
    pub total: Price,
    pub payment_method: PaymentMethod,
}
