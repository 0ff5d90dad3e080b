//! Site configuration store: logo, announcement banner, navigation menus,
//! shipping settings.
//!
//! Chrome data fails silently: a backend error surfaces as an absent logo or
//! banner and an empty menu tree, never as an error the caller must handle.
//! Where a stale cached value exists it is served instead of nothing.
//! Shipping settings are the exception, since checkout cannot quote without
//! them, so that lookup returns a `Result` after trying a stale fallback.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::backend::SiteConfigApi;
use crate::cache::{CacheScope, TtlCache};
use crate::config::TtlConfig;
use crate::error::Result;
use crate::shipping::ShippingSettings;
use crate::types::MenuNode;

const LOGO_KEY: &str = "site:logo";
const BANNER_KEY: &str = "site:banner";
const MENUS_KEY: &str = "site:menus";
const SHIPPING_KEY: &str = "site:shipping";

/// Cached reader of site-wide configuration.
pub struct SiteConfigStore {
    api: Arc<dyn SiteConfigApi>,
    cache: Arc<TtlCache>,
    ttl: TtlConfig,
}

impl SiteConfigStore {
    #[must_use]
    pub fn new(api: Arc<dyn SiteConfigApi>, cache: Arc<TtlCache>, ttl: TtlConfig) -> Self {
        Self { api, cache, ttl }
    }

    /// The logo URL, or `None` when unset or unreachable.
    #[instrument(skip(self))]
    pub async fn logo_url(&self) -> Option<String> {
        let api = Arc::clone(&self.api);
        let fetched = self
            .cache
            .fetch_through(LOGO_KEY, CacheScope::Global, self.ttl.logo, move || async move {
                api.fetch_logo_url().await
            })
            .await;
        match fetched {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "logo fetch failed; serving last known value");
                self.cache.read_any::<Option<String>>(LOGO_KEY).await.flatten()
            }
        }
    }

    /// The announcement banner text, or `None` when unset or unreachable.
    #[instrument(skip(self))]
    pub async fn announcement(&self) -> Option<String> {
        let api = Arc::clone(&self.api);
        let fetched = self
            .cache
            .fetch_through(
                BANNER_KEY,
                CacheScope::Global,
                self.ttl.banner,
                move || async move { api.fetch_announcement().await },
            )
            .await;
        match fetched {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "banner fetch failed; serving last known value");
                self.cache.read_any::<Option<String>>(BANNER_KEY).await.flatten()
            }
        }
    }

    /// The navigation tree; empty when unreachable and nothing is cached.
    #[instrument(skip(self))]
    pub async fn menu_tree(&self) -> Vec<MenuNode> {
        let api = Arc::clone(&self.api);
        let fetched = self
            .cache
            .fetch_through(
                MENUS_KEY,
                CacheScope::Global,
                self.ttl.menus,
                move || async move { api.fetch_menu_tree().await },
            )
            .await;
        match fetched {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, "menu fetch failed; serving last known tree");
                self.cache
                    .read_any::<Vec<MenuNode>>(MENUS_KEY)
                    .await
                    .unwrap_or_default()
            }
        }
    }

    /// Shipping settings for checkout quoting.
    ///
    /// # Errors
    ///
    /// Returns the backend error only when the fetch fails and no previously
    /// cached settings exist even stale.
    #[instrument(skip(self))]
    pub async fn shipping_settings(&self) -> Result<ShippingSettings> {
        let api = Arc::clone(&self.api);
        let fetched = self
            .cache
            .fetch_through(
                SHIPPING_KEY,
                CacheScope::Global,
                self.ttl.shipping,
                move || async move { api.fetch_shipping_settings().await },
            )
            .await;
        match fetched {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(error = %e, "shipping settings fetch failed; trying last known value");
                match self.cache.read_any::<ShippingSettings>(SHIPPING_KEY).await {
                    Some(settings) => Ok(settings),
                    None => Err(e.into()),
                }
            }
        }
    }
}
