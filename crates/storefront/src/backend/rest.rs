//! REST implementation of the backend traits.
//!
//! The backend exposes a PostgREST-style row API under `rest/v1/` and an
//! identity API under `auth/v1/`. Every request carries the public `apikey`
//! header; row access is authorized by the bearer token of the signed-in
//! session (falling back to the anon key when signed out).
//!
//! Numeric columns travel as strings to avoid binary floating point; they
//! are parsed into `Decimal` on the way in.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use async_trait::async_trait;

use solera_core::{
    CartLineId, CurrencyCode, Email, OrderId, Price, ProductId, UserId, VariantId,
};

use crate::shipping::{ShippingOption, ShippingSettings};
use crate::types::{
    AuthSession, CartLine, MenuNode, NewCartItem, OrderDraft, ProductSnapshot, VariantSnapshot,
};

use super::{
    BackendError, CartApi, FavoritesApi, IdentityApi, OrdersApi, ProfileApi, ProfileRecord,
    SiteConfigApi,
};

/// REST client for the remote backend.
///
/// Cheaply cloneable; all clones share the HTTP connection pool and the
/// stored session token.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    http: reqwest::Client,
    rest_base: Url,
    auth_base: Url,
    anon_key: String,
    currency: CurrencyCode,
    access_token: RwLock<Option<SecretString>>,
}

impl RestBackend {
    /// Create a client for the given backend base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry the `rest/v1/` and
    /// `auth/v1/` sub-paths.
    pub fn new(
        base_url: &Url,
        anon_key: &str,
        currency: CurrencyCode,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            inner: Arc::new(RestBackendInner {
                http: reqwest::Client::new(),
                rest_base: base_url.join("rest/v1/")?,
                auth_base: base_url.join("auth/v1/")?,
                anon_key: anon_key.to_string(),
                currency,
                access_token: RwLock::new(None),
            }),
        })
    }

    /// The bearer value for the next request: session token if present,
    /// anon key otherwise.
    async fn bearer(&self) -> String {
        match self.inner.access_token.read().await.as_ref() {
            Some(token) => token.expose_secret().to_string(),
            None => self.inner.anon_key.clone(),
        }
    }

    fn rest_url(&self, table: &str) -> Result<Url, BackendError> {
        self.inner.rest_base.join(table).map_err(BackendError::from)
    }

    /// Turn a response into its body text, mapping non-success statuses.
    async fn read_body(response: reqwest::Response) -> Result<String, BackendError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "backend returned non-success status"
        );
        Err(BackendError::Status {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        })
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let response = self
            .inner
            .http
            .get(self.rest_url(table)?)
            .query(query)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(self.bearer().await)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Insert a row and return the representation the backend sends back.
    async fn insert_row<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .inner
            .http
            .post(self.rest_url(table)?)
            .query(query)
            .header("apikey", &self.inner.anon_key)
            .header("Prefer", "return=representation")
            .bearer_auth(self.bearer().await)
            .json(body)
            .send()
            .await?;
        let text = Self::read_body(response).await?;
        let mut rows: Vec<T> = serde_json::from_str(&text)?;
        rows.pop().ok_or_else(|| {
            BackendError::NotFound(format!("inserted row missing from {table} response"))
        })
    }

    async fn patch_rows<B: Serialize>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<(), BackendError> {
        let response = self
            .inner
            .http
            .patch(self.rest_url(table)?)
            .query(query)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(self.bearer().await)
            .json(body)
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    async fn delete_rows(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<(), BackendError> {
        let response = self
            .inner
            .http
            .delete(self.rest_url(table)?)
            .query(query)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(self.bearer().await)
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    /// Fetch a single `site_settings` value by key.
    async fn setting(&self, key: &str) -> Result<Option<serde_json::Value>, BackendError> {
        let rows: Vec<SettingRow> = self
            .get_rows(
                "site_settings",
                &[
                    ("select", "value".to_string()),
                    ("key", format!("eq.{key}")),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }
}

// =============================================================================
// Wire rows
// =============================================================================

#[derive(Debug, Deserialize)]
struct SettingRow {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    email: String,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
}

impl AuthUser {
    fn into_session(self) -> Result<AuthSession, BackendError> {
        let email = Email::parse(&self.email)
            .map_err(|_| BackendError::NotFound("token has invalid email claim".into()))?;
        Ok(AuthSession {
            user_id: self.id,
            email,
            display_name: self.user_metadata.and_then(|m| m.full_name),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CartItemRow {
    id: CartLineId,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    quantity: u32,
    product: ProductRow,
    variant: Option<VariantRow>,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    name: String,
    /// Numeric as string; parsed into `Decimal`.
    price: String,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VariantRow {
    color_name: Option<String>,
    size_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FavoriteRow {
    product_id: ProductId,
}

#[derive(Debug, Deserialize)]
struct MenuItemRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    label: String,
    href: String,
    #[serde(default)]
    sort_order: i32,
}

#[derive(Debug, Deserialize)]
struct ShippingSettingsValue {
    free_shipping_threshold: String,
    options: Vec<ShippingOptionValue>,
}

#[derive(Debug, Deserialize)]
struct ShippingOptionValue {
    id: String,
    name: String,
    cost: String,
    #[serde(default)]
    estimated_days: String,
    #[serde(default)]
    description: String,
    #[serde(default = "enabled_default")]
    enabled: bool,
}

const fn enabled_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct InsertedOrderRow {
    id: OrderId,
}

#[derive(Debug, Serialize)]
struct OrderInsert<'a> {
    user_id: UserId,
    items: &'a [CartLine],
    delivery: &'a crate::types::Address,
    billing: &'a crate::types::Address,
    shipping_option_id: &'a str,
    subtotal: String,
    shipping_cost: String,
    total: String,
    payment_method: crate::types::PaymentMethod,
}

// =============================================================================
// Conversions
// =============================================================================

fn parse_price(raw: &str, currency: CurrencyCode) -> Result<Price, BackendError> {
    Ok(Price::new(Decimal::from_str(raw)?, currency))
}

fn convert_cart_row(row: CartItemRow, currency: CurrencyCode) -> Result<CartLine, BackendError> {
    Ok(CartLine {
        id: row.id,
        product_id: row.product_id,
        variant_id: row.variant_id,
        quantity: row.quantity,
        product: ProductSnapshot {
            name: row.product.name,
            price: parse_price(&row.product.price, currency)?,
            images: row.product.images,
        },
        variant: row.variant.map(|v| VariantSnapshot {
            color_name: v.color_name,
            size_name: v.size_name,
        }),
    })
}

fn convert_shipping_settings(
    value: ShippingSettingsValue,
    currency: CurrencyCode,
) -> Result<ShippingSettings, BackendError> {
    Ok(ShippingSettings {
        free_shipping_threshold: parse_price(&value.free_shipping_threshold, currency)?,
        options: value
            .options
            .into_iter()
            .map(|o| {
                Ok(ShippingOption {
                    cost: parse_price(&o.cost, currency)?,
                    id: o.id,
                    name: o.name,
                    estimated_days: o.estimated_days,
                    description: o.description,
                    enabled: o.enabled,
                })
            })
            .collect::<Result<_, BackendError>>()?,
    })
}

/// Assemble flat `menu_items` rows into a navigation tree.
///
/// Children attach to their parent by `parent_id`; roots and siblings are
/// ordered by `sort_order`. Rows pointing at a missing parent are dropped.
fn build_menu_tree(mut rows: Vec<MenuItemRow>) -> Vec<MenuNode> {
    rows.sort_by_key(|row| row.sort_order);

    fn attach(rows: &[MenuItemRow], parent: Option<Uuid>) -> Vec<MenuNode> {
        rows.iter()
            .filter(|row| row.parent_id == parent)
            .map(|row| MenuNode {
                label: row.label.clone(),
                href: row.href.clone(),
                children: attach(rows, Some(row.id)),
            })
            .collect()
    }

    attach(&rows, None)
}

const CART_SELECT: &str =
    "id,product_id,variant_id,quantity,product:products(name,price,images),variant:variants(color_name,size_name)";

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl IdentityApi for RestBackend {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthSession, BackendError> {
        let url = self
            .inner
            .auth_base
            .join("token")
            .map_err(BackendError::from)?;
        let response = self
            .inner
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.inner.anon_key)
            .json(&serde_json::json!({
                "email": email.as_str(),
                "password": password,
            }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(BackendError::InvalidCredentials);
        }

        let body = Self::read_body(response).await?;
        let token: TokenResponse = serde_json::from_str(&body)?;

        *self.inner.access_token.write().await =
            Some(SecretString::from(token.access_token));

        debug!("signed in");
        token.user.into_session()
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self.inner.access_token.write().await.take();
        let Some(token) = token else {
            return Ok(());
        };

        let url = self
            .inner
            .auth_base
            .join("logout")
            .map_err(BackendError::from)?;
        let response = self
            .inner
            .http
            .post(url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let bearer = {
            let guard = self.inner.access_token.read().await;
            match guard.as_ref() {
                Some(token) => token.expose_secret().to_string(),
                None => return Ok(None),
            }
        };

        let url = self
            .inner
            .auth_base
            .join("user")
            .map_err(BackendError::from)?;
        let response = self
            .inner
            .http
            .get(url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // token expired; forget it
            *self.inner.access_token.write().await = None;
            return Ok(None);
        }

        let body = Self::read_body(response).await?;
        let user: AuthUser = serde_json::from_str(&body)?;
        user.into_session().map(Some)
    }
}

#[async_trait]
impl ProfileApi for RestBackend {
    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, BackendError> {
        let rows: Vec<ProfileRecord> = self
            .get_rows(
                "profiles",
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{user}")),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl CartApi for RestBackend {
    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_cart(&self, user: UserId) -> Result<Vec<CartLine>, BackendError> {
        let rows: Vec<CartItemRow> = self
            .get_rows(
                "cart_items",
                &[
                    ("select", CART_SELECT.to_string()),
                    ("user_id", format!("eq.{user}")),
                ],
            )
            .await?;
        rows.into_iter()
            .map(|row| convert_cart_row(row, self.inner.currency))
            .collect()
    }

    #[instrument(skip(self, item))]
    async fn insert_line(&self, item: NewCartItem) -> Result<CartLine, BackendError> {
        let row: CartItemRow = self
            .insert_row(
                "cart_items",
                &[("select", CART_SELECT.to_string())],
                &item,
            )
            .await?;
        convert_cart_row(row, self.inner.currency)
    }

    #[instrument(skip(self), fields(line = %line))]
    async fn update_quantity(&self, line: CartLineId, quantity: u32) -> Result<(), BackendError> {
        self.patch_rows(
            "cart_items",
            &[("id", format!("eq.{line}"))],
            &serde_json::json!({ "quantity": quantity }),
        )
        .await
    }

    #[instrument(skip(self), fields(line = %line))]
    async fn delete_line(&self, line: CartLineId) -> Result<(), BackendError> {
        self.delete_rows("cart_items", &[("id", format!("eq.{line}"))])
            .await
    }
}

#[async_trait]
impl FavoritesApi for RestBackend {
    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_favorites(&self, user: UserId) -> Result<Vec<ProductId>, BackendError> {
        let rows: Vec<FavoriteRow> = self
            .get_rows(
                "favorites",
                &[
                    ("select", "product_id".to_string()),
                    ("user_id", format!("eq.{user}")),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.product_id).collect())
    }

    #[instrument(skip(self))]
    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .insert_row(
                "favorites",
                &[],
                &serde_json::json!({ "user_id": user, "product_id": product }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError> {
        self.delete_rows(
            "favorites",
            &[
                ("user_id", format!("eq.{user}")),
                ("product_id", format!("eq.{product}")),
            ],
        )
        .await
    }
}

#[async_trait]
impl SiteConfigApi for RestBackend {
    #[instrument(skip(self))]
    async fn fetch_logo_url(&self) -> Result<Option<String>, BackendError> {
        Ok(self
            .setting("logo_url")
            .await?
            .and_then(|v| v.as_str().map(ToString::to_string)))
    }

    #[instrument(skip(self))]
    async fn fetch_announcement(&self) -> Result<Option<String>, BackendError> {
        Ok(self
            .setting("announcement_text")
            .await?
            .and_then(|v| v.as_str().map(ToString::to_string)))
    }

    #[instrument(skip(self))]
    async fn fetch_menu_tree(&self) -> Result<Vec<MenuNode>, BackendError> {
        let rows: Vec<MenuItemRow> = self
            .get_rows(
                "menu_items",
                &[("select", "id,parent_id,label,href,sort_order".to_string())],
            )
            .await?;
        Ok(build_menu_tree(rows))
    }

    #[instrument(skip(self))]
    async fn fetch_shipping_settings(&self) -> Result<ShippingSettings, BackendError> {
        let value = self
            .setting("shipping")
            .await?
            .ok_or_else(|| BackendError::NotFound("site_settings.shipping".into()))?;
        let parsed: ShippingSettingsValue = serde_json::from_value(value)?;
        convert_shipping_settings(parsed, self.inner.currency)
    }
}

#[async_trait]
impl OrdersApi for RestBackend {
    #[instrument(skip(self, draft), fields(user = %draft.user_id))]
    async fn submit_order(&self, draft: &OrderDraft) -> Result<OrderId, BackendError> {
        let insert = OrderInsert {
            user_id: draft.user_id,
            items: &draft.lines,
            delivery: &draft.delivery,
            billing: &draft.billing,
            shipping_option_id: &draft.shipping_option_id,
            subtotal: draft.subtotal.amount.to_string(),
            shipping_cost: draft.shipping_cost.amount.to_string(),
            total: draft.total.amount.to_string(),
            payment_method: draft.payment_method,
        };
        let row: InsertedOrderRow = self
            .insert_row("orders", &[("select", "id".to_string())], &insert)
            .await?;
        Ok(row.id)
    }
}
