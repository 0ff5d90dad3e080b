//! Favorites store.
//!
//! Toggles flip the local set immediately and write through to the backend;
//! a failed write reverses the flip, generation-guarded so the reversal is
//! dropped when a newer toggle for the same product has already landed.
//! Favorites are session-scoped in-memory state and are not persisted to
//! the durable cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{instrument, warn};

use solera_core::{ProductId, UserId};

use crate::backend::FavoritesApi;
use crate::error::{Result, StoreError};

#[derive(Default)]
struct FavoritesState {
    user: Option<UserId>,
    products: HashSet<ProductId>,
}

/// Holds the signed-in user's favorited product IDs.
pub struct FavoritesStore {
    api: Arc<dyn FavoritesApi>,
    state: RwLock<FavoritesState>,
    generation: AtomicU64,
}

impl FavoritesStore {
    #[must_use]
    pub fn new(api: Arc<dyn FavoritesApi>) -> Self {
        Self {
            api,
            state: RwLock::new(FavoritesState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Load favorites for a freshly signed-in user.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is then an empty set for that
    /// user so toggles still work.
    #[instrument(skip(self))]
    pub async fn load(&self, user: UserId) -> Result<()> {
        let fetched = self.api.fetch_favorites(user).await;
        let mut state = self.state.write().await;
        state.user = Some(user);
        match fetched {
            Ok(products) => {
                state.products = products.into_iter().collect();
                Ok(())
            }
            Err(e) => {
                state.products = HashSet::new();
                Err(e.into())
            }
        }
    }

    /// Forget favorites on sign-out.
    pub async fn handle_sign_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.write().await = FavoritesState::default();
    }

    /// Flip a product's favorite status, optimistically.
    ///
    /// The flip is applied locally first; if the backend write fails, the
    /// flip is reversed unless a newer toggle has landed in the meantime.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotSignedIn`] when no user is loaded; otherwise the
    /// backend error after the reversal.
    #[instrument(skip(self))]
    pub async fn toggle_favorite(&self, product: ProductId) -> Result<()> {
        let (user, now_favorite, issued) = {
            let mut state = self.state.write().await;
            let user = state.user.ok_or(StoreError::NotSignedIn)?;
            let now_favorite = if state.products.remove(&product) {
                false
            } else {
                state.products.insert(product);
                true
            };
            let issued = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (user, now_favorite, issued)
        };

        let written = if now_favorite {
            self.api.add_favorite(user, product).await
        } else {
            self.api.remove_favorite(user, product).await
        };

        if let Err(e) = written {
            warn!(product = %product, error = %e, "favorite write failed; reversing");
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) == issued && state.user == Some(user) {
                if now_favorite {
                    state.products.remove(&product);
                } else {
                    state.products.insert(product);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn is_favorite(&self, product: ProductId) -> bool {
        self.state.read().await.products.contains(&product)
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.products.len()
    }

    pub async fn products(&self) -> Vec<ProductId> {
        self.state.read().await.products.iter().copied().collect()
    }
}
