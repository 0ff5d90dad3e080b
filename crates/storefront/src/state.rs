//! Explicitly constructed service container.
//!
//! [`Services`] owns the cache, every store, and the backend handles, and
//! is the only place cross-store choreography lives: signing in loads the
//! cart and favorites, signing out clears them, checkout is begun from the
//! current cart snapshot. Callers construct one `Services` per application
//! root (or per test) and clone it freely.

use std::sync::Arc;

use tracing::{instrument, warn};

use solera_core::Email;

use crate::backend::rest::RestBackend;
use crate::backend::{
    BackendError, CartApi, FavoritesApi, IdentityApi, OrdersApi, ProfileApi, SiteConfigApi,
};
use crate::cache::TtlCache;
use crate::checkout::{CheckoutFlow, CityDirectory};
use crate::config::StorefrontConfig;
use crate::error::Result;
use crate::shipping::TableShippingCalculator;
use crate::stores::{CartStore, FavoritesStore, SessionStore, SiteConfigStore};
use crate::types::AuthEvent;

/// One `Arc<dyn _>` per backend concern, so tests can swap any subset.
pub struct BackendHandles {
    pub identity: Arc<dyn IdentityApi>,
    pub profiles: Arc<dyn ProfileApi>,
    pub cart: Arc<dyn CartApi>,
    pub favorites: Arc<dyn FavoritesApi>,
    pub site: Arc<dyn SiteConfigApi>,
    pub orders: Arc<dyn OrdersApi>,
}

impl BackendHandles {
    /// All six concerns served by one REST client.
    #[must_use]
    pub fn rest(backend: RestBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            identity: Arc::clone(&backend) as Arc<dyn IdentityApi>,
            profiles: Arc::clone(&backend) as Arc<dyn ProfileApi>,
            cart: Arc::clone(&backend) as Arc<dyn CartApi>,
            favorites: Arc::clone(&backend) as Arc<dyn FavoritesApi>,
            site: Arc::clone(&backend) as Arc<dyn SiteConfigApi>,
            orders: backend,
        }
    }
}

struct ServicesInner {
    config: StorefrontConfig,
    session: SessionStore,
    cart: CartStore,
    favorites: FavoritesStore,
    site: SiteConfigStore,
    orders: Arc<dyn OrdersApi>,
}

/// The wired client-state layer. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Services {
    inner: Arc<ServicesInner>,
}

impl Services {
    /// Wire the stores over the given backend handles.
    #[must_use]
    pub fn new(config: StorefrontConfig, handles: BackendHandles) -> Self {
        let cache = Arc::new(TtlCache::new(Some(config.cache_dir.clone())));
        let session = SessionStore::new(
            handles.identity,
            handles.profiles,
            Arc::clone(&cache),
            config.ttl.profile,
        );
        let cart = CartStore::new(
            handles.cart,
            Arc::clone(&cache),
            config.ttl.cart,
            config.currency,
        );
        let favorites = FavoritesStore::new(handles.favorites);
        let site = SiteConfigStore::new(handles.site, cache, config.ttl);
        Self {
            inner: Arc::new(ServicesInner {
                config,
                session,
                cart,
                favorites,
                site,
                orders: handles.orders,
            }),
        }
    }

    /// Wire the stores over the REST backend named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend base URL cannot carry the API
    /// sub-paths.
    pub fn from_config(config: StorefrontConfig) -> Result<Self> {
        let backend = RestBackend::new(
            &config.backend_url,
            &config.backend_anon_key,
            config.currency,
        )
        .map_err(BackendError::from)?;
        Ok(Self::new(config, BackendHandles::rest(backend)))
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesStore {
        &self.inner.favorites
    }

    #[must_use]
    pub fn site(&self) -> &SiteConfigStore {
        &self.inner.site
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrdersApi {
        self.inner.orders.as_ref()
    }

    /// Sign in and load the user's cart and favorites.
    ///
    /// Load failures are logged, not fatal: the session is established
    /// either way and the stores hold empty state until the next refetch.
    ///
    /// # Errors
    ///
    /// The sign-in error itself (for example bad credentials).
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<()> {
        self.inner.session.sign_in(email, password).await?;
        self.sync_user_stores().await;
        Ok(())
    }

    /// Sign out, clear the per-user stores, and purge user-scoped cache.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        self.inner.session.sign_out().await;
        self.inner.cart.handle_sign_out().await;
        self.inner.favorites.handle_sign_out().await;
    }

    /// Restore a persisted session at application start, if one exists.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the identity provider is unreachable.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<()> {
        self.inner.session.restore().await?;
        self.sync_user_stores().await;
        Ok(())
    }

    /// Route an externally observed identity event through the session
    /// store and keep the per-user stores in step.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        let signing_out = matches!(event, AuthEvent::SignedOut);
        self.inner.session.on_auth_change(event).await;
        if signing_out {
            self.inner.cart.handle_sign_out().await;
            self.inner.favorites.handle_sign_out().await;
        } else {
            self.sync_user_stores().await;
        }
    }

    async fn sync_user_stores(&self) {
        let Some(user) = self.inner.session.current_user().await else {
            return;
        };
        if let Err(e) = self.inner.cart.load(user).await {
            warn!(user = %user, error = %e, "cart load failed after sign-in");
        }
        if let Err(e) = self.inner.favorites.load(user).await {
            warn!(user = %user, error = %e, "favorites load failed after sign-in");
        }
    }

    /// Begin checkout over the current cart, quoting with the live
    /// shipping settings.
    ///
    /// # Errors
    ///
    /// [`crate::checkout::CheckoutError::EmptyCart`] over an empty cart, or
    /// the backend error when shipping settings cannot be read at all.
    #[instrument(skip(self, directory))]
    pub async fn begin_checkout(&self, directory: CityDirectory) -> Result<CheckoutFlow> {
        let settings = self.inner.site.shipping_settings().await?;
        let lines = self.inner.cart.lines().await;
        let profile = self.inner.session.profile().await;
        let flow = CheckoutFlow::begin(
            lines,
            profile.as_ref(),
            directory,
            Arc::new(TableShippingCalculator::new(settings)),
            self.inner.config.currency,
        )?;
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use solera_core::{CurrencyCode, ProductId, Role, UserId};
    use url::Url;

    use crate::backend::ProfileRecord;
    use crate::backend::mock::MockBackend;
    use crate::checkout::{AddressKind, City};
    use crate::config::TtlConfig;
    use crate::shipping::test_support::standard_settings;

    use super::*;

    fn handles(backend: &Arc<MockBackend>) -> BackendHandles {
        BackendHandles {
            identity: Arc::clone(backend) as Arc<dyn IdentityApi>,
            profiles: Arc::clone(backend) as Arc<dyn ProfileApi>,
            cart: Arc::clone(backend) as Arc<dyn CartApi>,
            favorites: Arc::clone(backend) as Arc<dyn FavoritesApi>,
            site: Arc::clone(backend) as Arc<dyn SiteConfigApi>,
            orders: Arc::clone(backend) as Arc<dyn OrdersApi>,
        }
    }

    fn config(dir: &std::path::Path) -> StorefrontConfig {
        StorefrontConfig {
            backend_url: Url::parse("http://localhost:54321/").unwrap(),
            backend_anon_key: "anon".into(),
            cache_dir: dir.to_path_buf(),
            currency: CurrencyCode::TRY,
            ttl: TtlConfig::default(),
        }
    }

    async fn signed_in_services(backend: &Arc<MockBackend>, dir: &std::path::Path) -> Services {
        let user = UserId::generate();
        backend.seed_session(user, "ada@example.com").await;
        backend
            .seed_profile(ProfileRecord {
                id: user,
                email: Email::parse("ada@example.com").unwrap(),
                display_name: Some("Ada Yilmaz".into()),
                phone: Some("+90 555 000 00 00".into()),
                role: Role::Customer,
            })
            .await;

        let services = Services::new(config(dir), handles(backend));
        services
            .sign_in(&Email::parse("ada@example.com").unwrap(), "pw")
            .await
            .unwrap();
        services
    }

    fn directory() -> CityDirectory {
        CityDirectory::new(vec![City {
            name: "Istanbul".into(),
            districts: vec!["Kadikoy".into()],
        }])
    }

    #[tokio::test]
    async fn sign_in_loads_cart_and_favorites() {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let product = ProductId::generate();

        let services = signed_in_services(&backend, dir.path()).await;
        let user = services.session().current_user().await.unwrap();
        backend.favorite_rows.lock().await.insert((user, product));

        // favorites were loaded before the row existed; a fresh sign-in
        // cycle picks it up
        services.sign_out().await;
        services
            .sign_in(&Email::parse("ada@example.com").unwrap(), "pw")
            .await
            .unwrap();

        assert!(services.favorites().is_favorite(product).await);
        assert!(services.cart().is_empty().await);
        assert!(services.session().is_signed_in().await);
    }

    #[tokio::test]
    async fn sign_out_purges_user_cache_but_keeps_global() {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        *backend.logo.lock().await = Some("logo.svg".into());

        let services = signed_in_services(&backend, dir.path()).await;
        services.cart().add_to_cart(ProductId::generate(), None, 1).await.unwrap();
        assert_eq!(services.site().logo_url().await.as_deref(), Some("logo.svg"));
        let cart_fetches_before = backend.cart_fetches.load(Ordering::SeqCst);
        let site_fetches_before = backend.site_fetches.load(Ordering::SeqCst);

        services.sign_out().await;
        assert!(services.cart().is_empty().await);

        services
            .sign_in(&Email::parse("ada@example.com").unwrap(), "pw")
            .await
            .unwrap();

        // the cart snapshot was purged with the user scope, so sign-in had
        // to refetch it; the logo stayed cached
        assert!(backend.cart_fetches.load(Ordering::SeqCst) > cart_fetches_before);
        assert_eq!(services.site().logo_url().await.as_deref(), Some("logo.svg"));
        assert_eq!(backend.site_fetches.load(Ordering::SeqCst), site_fetches_before);
        assert_eq!(services.cart().cart_count().await, 1);
    }

    #[tokio::test]
    async fn restore_resumes_a_persisted_session() {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::generate();
        backend.seed_session(user, "ada@example.com").await;

        let services = Services::new(config(dir.path()), handles(&backend));
        services.restore().await.unwrap();

        assert_eq!(services.session().current_user().await, Some(user));
    }

    #[tokio::test]
    async fn checkout_end_to_end_places_an_order() {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        *backend.shipping.lock().await = Some(standard_settings());

        let services = signed_in_services(&backend, dir.path()).await;
        let user = services.session().current_user().await.unwrap();
        services.cart().add_to_cart(ProductId::generate(), None, 2).await.unwrap();

        let mut flow = services.begin_checkout(directory()).await.unwrap();

        // prefilled from the remote profile
        assert_eq!(flow.form(AddressKind::Delivery).full_name, "Ada Yilmaz");
        flow.form_mut(AddressKind::Delivery).line1 = "Moda Cad. 1".into();
        flow.select_city(AddressKind::Delivery, "Istanbul");
        flow.select_district(AddressKind::Delivery, "Kadikoy").unwrap();
        flow.advance().unwrap();
        flow.advance().unwrap();
        flow.set_terms_accepted(true);

        flow.submit(services.orders(), user).await.unwrap();

        let submitted = backend.submitted.lock().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].user_id, user);
        assert_eq!(submitted[0].lines.len(), 1);
    }

    #[tokio::test]
    async fn begin_checkout_rejects_an_empty_cart() {
        let backend = MockBackend::new();
        let dir = tempfile::tempdir().unwrap();
        *backend.shipping.lock().await = Some(standard_settings());

        let services = signed_in_services(&backend, dir.path()).await;
        let result = services.begin_checkout(directory()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rest_handles_build_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::from_config(config(dir.path())).unwrap();
        assert!(!services.session().is_signed_in().await);
    }
}
