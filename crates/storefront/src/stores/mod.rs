//! Shared-state stores.
//!
//! Each store owns one entity for the life of the application root and is
//! injected wherever it is read or mutated (no module-level singletons).
//! User-scoped stores ([`CartStore`], [`FavoritesStore`]) apply mutations
//! optimistically and reconcile on remote failure; [`SiteConfigStore`] is
//! read-only and never surfaces errors.

pub mod cart;
pub mod favorites;
pub mod session;
pub mod site_config;

pub use cart::CartStore;
pub use favorites::FavoritesStore;
pub use session::SessionStore;
pub use site_config::SiteConfigStore;
