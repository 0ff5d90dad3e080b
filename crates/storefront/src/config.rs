//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BACKEND_URL` - Base URL of the remote backend service
//! - `STOREFRONT_BACKEND_ANON_KEY` - Public API key sent with every request
//!
//! ## Optional
//! - `STOREFRONT_CACHE_DIR` - Directory for durable cache snapshots
//!   (default: `<tmp>/solera-cache`)
//! - `STOREFRONT_CURRENCY` - Store currency code (default: TRY)
//! - `STOREFRONT_PROFILE_TTL_SECS` - Profile cache TTL (default: 600)
//! - `STOREFRONT_CART_TTL_SECS` - Cart cache TTL (default: 120)
//! - `STOREFRONT_LOGO_TTL_SECS` - Logo cache TTL (default: 3600)
//! - `STOREFRONT_BANNER_TTL_SECS` - Announcement banner TTL (default: 1800)
//! - `STOREFRONT_MENUS_TTL_SECS` - Navigation tree TTL (default: 900)
//! - `STOREFRONT_SHIPPING_TTL_SECS` - Shipping settings TTL (default: 1800)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use solera_core::CurrencyCode;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Per-entity cache freshness windows.
#[derive(Debug, Clone, Copy)]
pub struct TtlConfig {
    pub profile: Duration,
    pub cart: Duration,
    pub logo: Duration,
    pub banner: Duration,
    pub menus: Duration,
    pub shipping: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            profile: Duration::from_secs(600),
            cart: Duration::from_secs(120),
            logo: Duration::from_secs(3600),
            banner: Duration::from_secs(1800),
            menus: Duration::from_secs(900),
            shipping: Duration::from_secs(1800),
        }
    }
}

/// Storefront client-state configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the remote backend (row CRUD + identity).
    pub backend_url: Url,
    /// Public API key for the backend. Not a secret: it is shipped to every
    /// client; row access is enforced server-side per session.
    pub backend_anon_key: String,
    /// Directory for durable cache snapshot files.
    pub cache_dir: PathBuf,
    /// Currency every price in this store is denominated in.
    pub currency: CurrencyCode,
    /// Cache freshness windows.
    pub ttl: TtlConfig,
}

impl StorefrontConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Tests drive this with a map instead of mutating the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url = required(&lookup, "STOREFRONT_BACKEND_URL")?;
        let backend_url = Url::parse(&backend_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BACKEND_URL".into(), e.to_string())
        })?;

        let backend_anon_key = required(&lookup, "STOREFRONT_BACKEND_ANON_KEY")?;

        let cache_dir = lookup("STOREFRONT_CACHE_DIR").map_or_else(
            || std::env::temp_dir().join("solera-cache"),
            PathBuf::from,
        );

        let currency = match lookup("STOREFRONT_CURRENCY").as_deref() {
            None | Some("TRY") => CurrencyCode::TRY,
            Some("USD") => CurrencyCode::USD,
            Some("EUR") => CurrencyCode::EUR,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar(
                    "STOREFRONT_CURRENCY".into(),
                    format!("unsupported currency: {other}"),
                ));
            }
        };

        let defaults = TtlConfig::default();
        let ttl = TtlConfig {
            profile: ttl_override(&lookup, "STOREFRONT_PROFILE_TTL_SECS", defaults.profile)?,
            cart: ttl_override(&lookup, "STOREFRONT_CART_TTL_SECS", defaults.cart)?,
            logo: ttl_override(&lookup, "STOREFRONT_LOGO_TTL_SECS", defaults.logo)?,
            banner: ttl_override(&lookup, "STOREFRONT_BANNER_TTL_SECS", defaults.banner)?,
            menus: ttl_override(&lookup, "STOREFRONT_MENUS_TTL_SECS", defaults.menus)?,
            shipping: ttl_override(&lookup, "STOREFRONT_SHIPPING_TTL_SECS", defaults.shipping)?,
        };

        Ok(Self {
            backend_url,
            backend_anon_key,
            cache_dir,
            currency,
            ttl,
        })
    }
}

fn required(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn ttl_override(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}
