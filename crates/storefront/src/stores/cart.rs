//! Cart aggregate store.
//!
//! The server rows are authoritative. Adds merge into an existing line for
//! the same `(product, variant)` pair; quantity updates and removals apply
//! optimistically and, on remote failure, reconcile by refetching the
//! authoritative cart. Every failed mutation also returns its error so the
//! caller can surface a transient notification. A monotonic generation
//! counter drops reconciliations that were issued before a newer local
//! mutation, so a slow refetch cannot clobber fresher optimistic state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use solera_core::{CartLineId, CurrencyCode, Price, ProductId, UserId, VariantId};

use crate::backend::CartApi;
use crate::cache::{CacheScope, TtlCache};
use crate::error::{Result, StoreError};
use crate::types::{CartLine, NewCartItem};

fn cart_key(user: UserId) -> String {
    format!("cart:{user}")
}

#[derive(Default)]
struct CartState {
    user: Option<UserId>,
    lines: Vec<CartLine>,
}

/// Holds the signed-in user's cart lines.
pub struct CartStore {
    api: Arc<dyn CartApi>,
    cache: Arc<TtlCache>,
    ttl: Duration,
    currency: CurrencyCode,
    state: RwLock<CartState>,
    /// Bumped on every local mutation; reconciliations carry the value they
    /// were issued under and are dropped if it has moved on.
    generation: AtomicU64,
}

impl CartStore {
    #[must_use]
    pub fn new(
        api: Arc<dyn CartApi>,
        cache: Arc<TtlCache>,
        ttl: Duration,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            api,
            cache,
            ttl,
            currency,
            state: RwLock::new(CartState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Load the cart for a freshly signed-in user, cache-checked first.
    ///
    /// # Errors
    ///
    /// Returns the backend error on a cache miss whose refetch fails; local
    /// state is then an empty cart for that user.
    #[instrument(skip(self))]
    pub async fn load(&self, user: UserId) -> Result<()> {
        let key = cart_key(user);

        if let Some(lines) = self.cache.read::<Vec<CartLine>>(&key, self.ttl).await {
            debug!(user = %user, lines = lines.len(), "cart cache hit");
            *self.state.write().await = CartState { user: Some(user), lines };
            return Ok(());
        }

        let fetched = self.api.fetch_cart(user).await;
        let mut state = self.state.write().await;
        state.user = Some(user);
        match fetched {
            Ok(lines) => {
                self.cache.write(&key, CacheScope::User, &lines).await;
                state.lines = lines;
                Ok(())
            }
            Err(e) => {
                state.lines = Vec::new();
                Err(e.into())
            }
        }
    }

    /// Forget the cart on sign-out. Cache purging is the session store's job.
    pub async fn handle_sign_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.write().await = CartState::default();
    }

    /// Add a product to the cart, merging into an existing line when one
    /// already holds the same `(product, variant)` pair.
    ///
    /// The merge path bumps the local quantity before the remote write; the
    /// new-line path inserts remotely first and appends the returned server
    /// row, so line IDs and price snapshots always originate server-side.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotSignedIn`] when no user is loaded; otherwise the
    /// backend error. A failed insert leaves local state unchanged; a failed
    /// merge write keeps the optimistic quantity (repaired by the next
    /// reload) but still reports the error.
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        product: ProductId,
        variant: Option<VariantId>,
        quantity: u32,
    ) -> Result<()> {
        let quantity = quantity.max(1);
        let user = self.require_user().await?;

        let merged = {
            let mut state = self.state.write().await;
            match state.lines.iter_mut().find(|l| l.matches(product, variant)) {
                Some(line) => {
                    line.quantity += quantity;
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    Some((line.id, line.quantity))
                }
                None => None,
            }
        };

        if let Some((line_id, new_quantity)) = merged {
            // optimistic bump stays applied either way; the next reload
            // repairs a failed write
            let written = self.api.update_quantity(line_id, new_quantity).await;
            self.snapshot(user).await;
            if let Err(e) = written {
                warn!(line = %line_id, error = %e, "cart merge write failed");
                return Err(e.into());
            }
            return Ok(());
        }

        let inserted = self
            .api
            .insert_line(NewCartItem {
                user_id: user,
                product_id: product,
                variant_id: variant,
                quantity,
            })
            .await?;

        let mut state = self.state.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        state.lines.push(inserted);
        let lines = state.lines.clone();
        drop(state);
        self.cache.write(&cart_key(user), CacheScope::User, &lines).await;
        Ok(())
    }

    /// Set a line's quantity. A quantity below one removes the line.
    ///
    /// Applies optimistically; a failed remote write reconciles by
    /// refetching the authoritative cart and returns the error.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotSignedIn`] when no user is loaded; otherwise the
    /// backend error after the reconcile.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, line: CartLineId, quantity: u32) -> Result<()> {
        if quantity < 1 {
            return self.remove_from_cart(line).await;
        }
        let user = self.require_user().await?;

        let issued = {
            let mut state = self.state.write().await;
            if let Some(l) = state.lines.iter_mut().find(|l| l.id == line) {
                l.quantity = quantity;
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        match self.api.update_quantity(line, quantity).await {
            Ok(()) => {
                self.snapshot(user).await;
                Ok(())
            }
            Err(e) => {
                warn!(line = %line, error = %e, "quantity update failed; reconciling");
                self.reconcile(user, issued).await;
                Err(e.into())
            }
        }
    }

    /// Remove a line. Applies optimistically; a failed remote delete
    /// reconciles by refetch and returns the error.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotSignedIn`] when no user is loaded; otherwise the
    /// backend error after the reconcile.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, line: CartLineId) -> Result<()> {
        let user = self.require_user().await?;

        let issued = {
            let mut state = self.state.write().await;
            state.lines.retain(|l| l.id != line);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        match self.api.delete_line(line).await {
            Ok(()) => {
                self.snapshot(user).await;
                Ok(())
            }
            Err(e) => {
                warn!(line = %line, error = %e, "line delete failed; reconciling");
                self.reconcile(user, issued).await;
                Err(e.into())
            }
        }
    }

    /// Refetch the authoritative cart and replace local state, unless a
    /// newer local mutation has landed since `issued` was taken.
    async fn reconcile(&self, user: UserId, issued: u64) {
        let fetched = match self.api.fetch_cart(user).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(user = %user, error = %e, "cart reconcile fetch failed; keeping optimistic state");
                return;
            }
        };

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != issued {
            debug!(user = %user, "dropping stale cart reconcile");
            return;
        }
        if state.user != Some(user) {
            return;
        }
        state.lines = fetched;
        let lines = state.lines.clone();
        drop(state);
        self.cache.write(&cart_key(user), CacheScope::User, &lines).await;
    }

    /// Write the current lines through to the durable cache.
    async fn snapshot(&self, user: UserId) {
        let lines = self.state.read().await.lines.clone();
        self.cache.write(&cart_key(user), CacheScope::User, &lines).await;
    }

    async fn require_user(&self) -> Result<UserId> {
        self.state.read().await.user.ok_or(StoreError::NotSignedIn)
    }

    /// Total units across all lines (a line of quantity 3 counts 3).
    pub async fn cart_count(&self) -> u32 {
        self.state.read().await.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sum of line totals.
    pub async fn subtotal(&self) -> Price {
        let state = self.state.read().await;
        state
            .lines
            .iter()
            .fold(Price::zero(self.currency), |acc, l| acc.add(l.line_total()))
    }

    pub async fn lines(&self) -> Vec<CartLine> {
        self.state.read().await.lines.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.lines.is_empty()
    }
}
