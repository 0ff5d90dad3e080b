//! Session store: the single writer of signed-in state.
//!
//! All identity-provider events funnel through [`SessionStore::on_auth_change`];
//! `sign_in`/`sign_out` delegate to the provider and route the outcome through
//! that same entry point, so there is exactly one writer of `user` and no
//! race between independent writers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tracing::{debug, instrument, warn};

use solera_core::{Email, UserId};

use crate::backend::{BackendError, IdentityApi, ProfileApi, ProfileRecord};
use crate::cache::{CacheScope, TtlCache};
use crate::types::{AuthEvent, AuthSession, Profile, ProfileSource};

fn profile_key(user: UserId) -> String {
    format!("profile:{user}")
}

struct SignedIn {
    session: AuthSession,
    profile: Profile,
}

/// Holds the current authenticated identity (or none) and its profile.
pub struct SessionStore {
    identity: Arc<dyn IdentityApi>,
    profiles: Arc<dyn ProfileApi>,
    cache: Arc<TtlCache>,
    profile_ttl: Duration,
    state: RwLock<Option<SignedIn>>,
    changed: watch::Sender<Option<UserId>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityApi>,
        profiles: Arc<dyn ProfileApi>,
        cache: Arc<TtlCache>,
        profile_ttl: Duration,
    ) -> Self {
        let (changed, _) = watch::channel(None);
        Self {
            identity,
            profiles,
            cache,
            profile_ttl,
            state: RwLock::new(None),
            changed,
        }
    }

    /// Handle an identity-provider event. The sole writer of `user`.
    ///
    /// Sign-in (and token refresh) loads the profile, cache-checked first;
    /// sign-out clears local state synchronously and purges user-scoped
    /// cache entries. Global entries (logo, banner, menus) are untouched.
    #[instrument(skip(self, event))]
    pub async fn on_auth_change(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                let profile = self.load_profile(&session).await;
                let user_id = session.user_id;
                *self.state.write().await = Some(SignedIn { session, profile });
                self.changed.send_replace(Some(user_id));
                debug!(user = %user_id, "session established");
            }
            AuthEvent::SignedOut => {
                *self.state.write().await = None;
                self.cache.purge_scope(CacheScope::User).await;
                self.changed.send_replace(None);
                debug!("session cleared");
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// Does not write `user` itself; the provider outcome is routed through
    /// [`Self::on_auth_change`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidCredentials`] on rejected credentials,
    /// or the transport error otherwise. Local state is unchanged on error.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<(), BackendError> {
        let session = self.identity.sign_in(email, password).await?;
        self.on_auth_change(AuthEvent::SignedIn(session)).await;
        Ok(())
    }

    /// Sign out.
    ///
    /// Local state is cleared and user-scoped cache entries purged even if
    /// the remote call fails; a stuck remote must not leave the client
    /// appearing authenticated.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "remote sign-out failed; clearing local state anyway");
        }
        self.on_auth_change(AuthEvent::SignedOut).await;
    }

    /// Restore the session held by the identity provider (app start).
    ///
    /// # Errors
    ///
    /// Returns the backend error if the provider cannot be reached.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<(), BackendError> {
        if let Some(session) = self.identity.current_session().await? {
            self.on_auth_change(AuthEvent::SignedIn(session)).await;
        }
        Ok(())
    }

    /// Fetch the profile, cache-checked first, falling back to synthesis.
    ///
    /// Guarantees a non-null profile for any signed-in identity: a missing
    /// or unreadable row yields a minimal profile built from token claims,
    /// marked [`ProfileSource::Synthesized`] and never cached (so the next
    /// sign-in retries the row).
    async fn load_profile(&self, session: &AuthSession) -> Profile {
        let key = profile_key(session.user_id);

        if let Some(profile) = self.cache.read::<Profile>(&key, self.profile_ttl).await {
            debug!(user = %session.user_id, "profile cache hit");
            return profile;
        }

        match self.profiles.fetch_profile(session.user_id).await {
            Ok(Some(record)) => {
                let profile = remote_profile(record, session);
                self.cache.write(&key, CacheScope::User, &profile).await;
                profile
            }
            Ok(None) => {
                warn!(user = %session.user_id, "profile row missing; synthesizing from claims");
                Profile::synthesized(session)
            }
            Err(e) => {
                warn!(user = %session.user_id, error = %e, "profile fetch failed; synthesizing from claims");
                Profile::synthesized(session)
            }
        }
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Option<UserId> {
        self.state.read().await.as_ref().map(|s| s.session.user_id)
    }

    /// The profile for the signed-in user; `None` only when signed out.
    pub async fn profile(&self) -> Option<Profile> {
        self.state.read().await.as_ref().map(|s| s.profile.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Subscribe to sign-in/sign-out transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.changed.subscribe()
    }
}

fn remote_profile(record: ProfileRecord, session: &AuthSession) -> Profile {
    Profile {
        id: record.id,
        email: record.email,
        // prefer the row's name, fall back to the token claim
        display_name: record.display_name.or_else(|| session.display_name.clone()),
        phone: record.phone,
        role: record.role,
        source: ProfileSource::Remote,
    }
}
