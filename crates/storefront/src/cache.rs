//! TTL-bounded, disk-backed cache for remotely-fetched entities.
//!
//! Every store uses one [`TtlCache`] with a different key and freshness
//! window per entity kind (profile 10 min, cart 2 min, logo 60 min, ...).
//! Entries are created on first successful fetch, overwritten on every later
//! one, and never expire in place: a stale entry stays readable via
//! [`TtlCache::read_any`] as a last-known-value fallback.
//!
//! Entries are snapshotted as JSON files under the configured cache
//! directory, so a fresh entry survives a process restart. Sign-out purges
//! user-scoped entries (profile, cart) and leaves global ones (logo, banner,
//! menus) untouched.
//!
//! Concurrent readers of the same stale key share a single upstream fetch:
//! [`TtlCache::fetch_through`] serializes refills per key through an
//! in-flight gate, so a burst of renders cannot stampede the backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::backend::BackendError;

/// Whether an entry belongs to the signed-in user or to the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Site-wide entries (logo, banner, menus). Never purged by sign-out.
    Global,
    /// Entries tied to an identity (profile, cart). Purged on sign-out.
    User,
}

/// A cached value with its fetch timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub scope: CacheScope,
}

impl<T> CacheEntry<T> {
    /// A read is fresh iff `now - fetched_at < ttl`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.fetched_at);
        chrono::Duration::from_std(ttl).is_ok_and(|limit| age < limit)
    }
}

/// Process-wide entity cache. Cheap to share via `Arc`.
pub struct TtlCache {
    /// Snapshot directory; `None` disables durability (in-memory only).
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<String, CacheEntry<serde_json::Value>>>,
    /// Per-key refill gates for fetch de-duplication.
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TtlCache {
    /// Create a cache with an optional durable snapshot directory.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Read a fresh value, or `None` on miss/stale.
    pub async fn read<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let entry = self.entry(key).await?;
        if !entry.is_fresh(ttl) {
            return None;
        }
        decode(key, &entry.value)
    }

    /// Read the last-known value regardless of freshness.
    ///
    /// Used by non-critical config reads to keep serving a stale value when
    /// a refetch fails.
    pub async fn read_any<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entry(key).await?;
        decode(key, &entry.value)
    }

    /// Store a value, stamping `fetched_at = now`, and snapshot it to disk.
    pub async fn write<T: Serialize>(&self, key: &str, scope: CacheScope, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "failed to encode cache entry; skipping");
                return;
            }
        };
        let entry = CacheEntry {
            value: json,
            fetched_at: Utc::now(),
            scope,
        };
        self.persist(key, &entry).await;
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry);
    }

    /// Read-through with in-flight de-duplication.
    ///
    /// Returns the cached value if fresh; otherwise at most one caller per
    /// key runs `fetch` while the rest wait and then hit the refilled cache.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error; the cache is left unchanged so a stale
    /// value remains available via [`Self::read_any`].
    pub async fn fetch_through<T, F, Fut>(
        &self,
        key: &str,
        scope: CacheScope,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, BackendError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        if let Some(value) = self.read(key, ttl).await {
            debug!(key, "cache hit");
            return Ok(value);
        }

        let gate = {
            let mut flights = self.flights.lock().await;
            Arc::clone(
                flights
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _refill = gate.lock().await;

        // Another caller may have refilled while we waited on the gate.
        if let Some(value) = self.read(key, ttl).await {
            debug!(key, "cache refilled while waiting");
            return Ok(value);
        }

        let value = fetch().await?;
        self.write(key, scope, &value).await;
        Ok(value)
    }

    /// Drop every entry in the given scope, in memory and on disk.
    pub async fn purge_scope(&self, scope: CacheScope) {
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.scope != scope);

        let Some(dir) = &self.dir else { return };
        let Ok(mut listing) = tokio::fs::read_dir(dir).await else {
            return;
        };
        while let Ok(Some(file)) = listing.next_entry().await {
            let path = file.path();
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<CacheEntry<serde_json::Value>>(&raw) else {
                continue;
            };
            if entry.scope == scope
                && let Err(e) = tokio::fs::remove_file(&path).await
            {
                warn!(path = %path.display(), error = %e, "failed to purge cache file");
            }
        }
    }

    /// Get an entry from memory, falling back to the disk snapshot.
    async fn entry(&self, key: &str) -> Option<CacheEntry<serde_json::Value>> {
        if let Some(entry) = self.entries.read().await.get(key) {
            return Some(entry.clone());
        }

        let entry = self.load(key).await?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry.clone());
        Some(entry)
    }

    async fn load(&self, key: &str) -> Option<CacheEntry<serde_json::Value>> {
        let path = self.dir.as_ref()?.join(file_name(key));
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache snapshot");
                None
            }
        }
    }

    /// Best-effort disk snapshot; failures are logged and ignored.
    async fn persist(&self, key: &str, entry: &CacheEntry<serde_json::Value>) {
        let Some(dir) = &self.dir else { return };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %e, "failed to create cache directory");
            return;
        }
        let Ok(raw) = serde_json::to_string(entry) else {
            return;
        };
        let path = dir.join(file_name(key));
        if let Err(e) = tokio::fs::write(&path, raw).await {
            warn!(path = %path.display(), error = %e, "failed to write cache snapshot");
        }
    }

    /// Shift an entry's timestamp into the past. Test hook for TTL expiry.
    #[cfg(test)]
    pub(crate) async fn backdate(&self, key: &str, by: Duration) {
        if let Some(entry) = self.entries.write().await.get_mut(key) {
            entry.fetched_at -= chrono::Duration::from_std(by).unwrap_or_default();
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "cached value has unexpected shape; treating as miss");
            None
        }
    }
}

/// Map a cache key to a snapshot file name.
fn file_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}.json")
}
