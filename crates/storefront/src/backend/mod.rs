//! Remote backend abstraction.
//!
//! The backend is an opaque collaborator: an identity provider plus
//! row-level CRUD over a handful of collections (`profiles`, `cart_items`,
//! `favorites`, `site_settings`, `menus`, `orders`). The stores only see the
//! traits below, so tests inject scripted mocks and production wires in
//! [`rest::RestBackend`].

pub mod rest;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use thiserror::Error;

use solera_core::{CartLineId, Email, OrderId, ProductId, Role, UserId};

use crate::shipping::ShippingSettings;
use crate::types::{AuthSession, CartLine, MenuNode, NewCartItem, OrderDraft};

/// Errors returned by the remote backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level failure (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A numeric column could not be parsed.
    #[error("invalid numeric value in response: {0}")]
    Numeric(#[from] rust_decimal::Error),

    /// A request URL could not be built from the configured base.
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    /// Sign-in was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,
}

/// A profile row as stored in the backend.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub email: Email,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Identity provider operations.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Exchange credentials for a session.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthSession, BackendError>;

    /// Invalidate the current session remotely.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The session attached to the stored token, if any.
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError>;
}

/// Profile row reads.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Fetch the profile row for a user; `Ok(None)` if the row is absent.
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, BackendError>;
}

/// Cart row CRUD.
#[async_trait]
pub trait CartApi: Send + Sync {
    async fn fetch_cart(&self, user: UserId) -> Result<Vec<CartLine>, BackendError>;

    /// Insert a new line; the backend assigns the ID and returns the row
    /// with denormalized product/variant snapshots.
    async fn insert_line(&self, item: NewCartItem) -> Result<CartLine, BackendError>;

    async fn update_quantity(&self, line: CartLineId, quantity: u32) -> Result<(), BackendError>;

    async fn delete_line(&self, line: CartLineId) -> Result<(), BackendError>;
}

/// Favorites row CRUD.
#[async_trait]
pub trait FavoritesApi: Send + Sync {
    async fn fetch_favorites(&self, user: UserId) -> Result<Vec<ProductId>, BackendError>;

    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError>;

    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError>;
}

/// Site configuration reads (all global scope).
#[async_trait]
pub trait SiteConfigApi: Send + Sync {
    async fn fetch_logo_url(&self) -> Result<Option<String>, BackendError>;

    async fn fetch_announcement(&self) -> Result<Option<String>, BackendError>;

    async fn fetch_menu_tree(&self) -> Result<Vec<MenuNode>, BackendError>;

    /// Server-configured shipping options and free-shipping threshold.
    async fn fetch_shipping_settings(&self) -> Result<ShippingSettings, BackendError>;
}

/// Order submission.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    async fn submit_order(&self, draft: &OrderDraft) -> Result<OrderId, BackendError>;
}
