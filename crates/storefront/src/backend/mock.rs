//! Scriptable in-memory backend for store tests.
//!
//! One mock implements every backend trait. Tests preload server-side rows,
//! flip failure flags per operation, and can gate an operation on a
//! [`Notify`] to interleave concurrent mutations deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, Notify};

use solera_core::{CartLineId, CurrencyCode, Email, OrderId, Price, ProductId, UserId, VariantId};

use crate::shipping::ShippingSettings;
use crate::types::{
    AuthSession, CartLine, MenuNode, NewCartItem, OrderDraft, ProductSnapshot, VariantSnapshot,
};

use super::{
    BackendError, CartApi, FavoritesApi, IdentityApi, OrdersApi, ProfileApi, ProfileRecord,
    SiteConfigApi,
};

fn remote_failed() -> BackendError {
    BackendError::Status {
        status: 500,
        message: "mock failure".into(),
    }
}

/// Build a cart line the way the backend would return it.
pub fn server_line(
    product: ProductId,
    variant: Option<VariantId>,
    quantity: u32,
    unit_price: Price,
) -> CartLine {
    CartLine {
        id: CartLineId::generate(),
        product_id: product,
        variant_id: variant,
        quantity,
        product: ProductSnapshot {
            name: "Linen shirt".into(),
            price: unit_price,
            images: vec!["shirt.jpg".into()],
        },
        variant: variant.map(|_| VariantSnapshot {
            color_name: Some("Sand".into()),
            size_name: Some("M".into()),
        }),
    }
}

/// 100.00 TRY; default unit price for mock-inserted lines.
pub fn default_price() -> Price {
    Price::new(Decimal::new(10000, 2), CurrencyCode::TRY)
}

#[derive(Default)]
pub struct MockBackend {
    // identity
    pub session: Mutex<Option<AuthSession>>,
    pub sign_out_fails: AtomicBool,

    // profiles
    pub profiles: Mutex<HashMap<UserId, ProfileRecord>>,
    pub profile_fetch_fails: AtomicBool,
    pub profile_fetches: AtomicUsize,

    // cart (authoritative server rows)
    pub cart_rows: Mutex<Vec<CartLine>>,
    pub insert_fails: AtomicBool,
    pub update_fails: AtomicBool,
    pub delete_fails: AtomicBool,
    pub cart_fetches: AtomicUsize,
    /// When set, `delete_line` waits here before finishing.
    pub delete_gate: Mutex<Option<Arc<Notify>>>,

    // favorites
    pub favorite_rows: Mutex<HashSet<(UserId, ProductId)>>,
    pub favorite_add_fails: AtomicBool,
    pub favorite_remove_fails: AtomicBool,

    // site config
    pub logo: Mutex<Option<String>>,
    pub banner: Mutex<Option<String>>,
    pub menus: Mutex<Vec<MenuNode>>,
    pub shipping: Mutex<Option<ShippingSettings>>,
    pub site_fails: AtomicBool,
    pub site_fetches: AtomicUsize,

    // orders
    pub submitted: Mutex<Vec<OrderDraft>>,
    pub submit_fails: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed_session(self: &Arc<Self>, user: UserId, email: &str) -> AuthSession {
        let session = AuthSession {
            user_id: user,
            email: Email::parse(email).expect("valid email"),
            display_name: Some("Test User".into()),
        };
        *self.session.lock().await = Some(session.clone());
        session
    }

    pub async fn seed_profile(self: &Arc<Self>, record: ProfileRecord) {
        self.profiles.lock().await.insert(record.id, record);
    }
}

#[async_trait]
impl IdentityApi for MockBackend {
    async fn sign_in(&self, email: &Email, _password: &str) -> Result<AuthSession, BackendError> {
        match self.session.lock().await.clone() {
            Some(session) if session.email == *email => Ok(session),
            _ => Err(BackendError::InvalidCredentials),
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(self.session.lock().await.clone())
    }
}

#[async_trait]
impl ProfileApi for MockBackend {
    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRecord>, BackendError> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        if self.profile_fetch_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        Ok(self.profiles.lock().await.get(&user).cloned())
    }
}

#[async_trait]
impl CartApi for MockBackend {
    async fn fetch_cart(&self, _user: UserId) -> Result<Vec<CartLine>, BackendError> {
        self.cart_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.cart_rows.lock().await.clone())
    }

    async fn insert_line(&self, item: NewCartItem) -> Result<CartLine, BackendError> {
        if self.insert_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        let line = server_line(
            item.product_id,
            item.variant_id,
            item.quantity,
            default_price(),
        );
        self.cart_rows.lock().await.push(line.clone());
        Ok(line)
    }

    async fn update_quantity(&self, line: CartLineId, quantity: u32) -> Result<(), BackendError> {
        if self.update_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        let mut rows = self.cart_rows.lock().await;
        match rows.iter_mut().find(|row| row.id == line) {
            Some(row) => {
                row.quantity = quantity;
                Ok(())
            }
            None => Err(BackendError::NotFound("cart line".into())),
        }
    }

    async fn delete_line(&self, line: CartLineId) -> Result<(), BackendError> {
        let gate = self.delete_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.delete_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        self.cart_rows.lock().await.retain(|row| row.id != line);
        Ok(())
    }
}

#[async_trait]
impl FavoritesApi for MockBackend {
    async fn fetch_favorites(&self, user: UserId) -> Result<Vec<ProductId>, BackendError> {
        Ok(self
            .favorite_rows
            .lock()
            .await
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, p)| *p)
            .collect())
    }

    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError> {
        if self.favorite_add_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        self.favorite_rows.lock().await.insert((user, product));
        Ok(())
    }

    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), BackendError> {
        if self.favorite_remove_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        self.favorite_rows.lock().await.remove(&(user, product));
        Ok(())
    }
}

#[async_trait]
impl SiteConfigApi for MockBackend {
    async fn fetch_logo_url(&self) -> Result<Option<String>, BackendError> {
        self.site_fetches.fetch_add(1, Ordering::SeqCst);
        if self.site_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        Ok(self.logo.lock().await.clone())
    }

    async fn fetch_announcement(&self) -> Result<Option<String>, BackendError> {
        self.site_fetches.fetch_add(1, Ordering::SeqCst);
        if self.site_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        Ok(self.banner.lock().await.clone())
    }

    async fn fetch_menu_tree(&self) -> Result<Vec<MenuNode>, BackendError> {
        self.site_fetches.fetch_add(1, Ordering::SeqCst);
        if self.site_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        Ok(self.menus.lock().await.clone())
    }

    async fn fetch_shipping_settings(&self) -> Result<ShippingSettings, BackendError> {
        self.site_fetches.fetch_add(1, Ordering::SeqCst);
        if self.site_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        self.shipping
            .lock()
            .await
            .clone()
            .ok_or_else(|| BackendError::NotFound("site_settings.shipping".into()))
    }
}

#[async_trait]
impl OrdersApi for MockBackend {
    async fn submit_order(&self, draft: &OrderDraft) -> Result<OrderId, BackendError> {
        if self.submit_fails.load(Ordering::SeqCst) {
            return Err(remote_failed());
        }
        self.submitted.lock().await.push(draft.clone());
        Ok(OrderId::generate())
    }
}
