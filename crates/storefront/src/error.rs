//! Unified error type for store operations.
//!
//! Each layer keeps its own error enum (`BackendError`, `ConfigError`,
//! `CheckoutError`); `StoreError` aggregates them for callers that drive the
//! stores directly. No error in this layer is fatal: every failure path
//! leaves the owning store in a well-defined, re-renderable state.

use thiserror::Error;

use crate::backend::BackendError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;

/// Top-level error type for the client-state layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A remote call failed. Mutations that hit this have already been
    /// reconciled locally (rollback or refetch); surface it as a transient
    /// notification.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Checkout validation or submission failed.
    #[error("checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A user-scoped operation was attempted with no session present.
    #[error("not signed in")]
    NotSignedIn,
}

/// Result type alias for [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_layer_prefix() {
        let err = StoreError::Backend(BackendError::NotFound("cart".into()));
        assert_eq!(err.to_string(), "backend error: not found: cart");

        assert_eq!(StoreError::NotSignedIn.to_string(), "not signed in");
    }

    #[test]
    fn converts_from_backend_error() {
        fn fails() -> Result<()> {
            Err(BackendError::NotFound("row".into()))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(StoreError::Backend(_))));
    }
}
