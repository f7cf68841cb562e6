use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::services::auth::keys::KeySource;

/// Minimum spacing between forced (unknown `kid`) refreshes.
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Time-bounded cache in front of a [`KeySource`].
///
/// - Readers never observe a half-written set: the whole `Arc<JwkSet>` is swapped.
/// - At most one fetch is in flight per cache; waiters re-check freshness after
///   acquiring the refresh lock instead of fetching again.
/// - A failed fetch leaves the previous (stale) set in place and returns the
///   error. [`KeyCache::stale`] lets the caller decide whether to use it.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    current: RwLock<Option<CachedKeys>>,
    // Held for the duration of a fetch; stores when the last forced refresh started.
    refresh: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").field("ttl", &self.ttl).finish()
    }
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached key set if younger than the TTL, otherwise a fresh fetch.
    pub async fn get(&self) -> Result<Arc<JwkSet>, AuthError> {
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        let _refresh = self.refresh.lock().await;

        // Someone else may have refreshed while we were waiting.
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        self.fetch_and_store().await
    }

    /// Refetch because a token named a `kid` the cached set does not contain.
    ///
    /// Within [`MIN_FORCED_REFRESH_INTERVAL`] of the previous forced refresh no
    /// fetch happens and the currently cached set is returned instead. That set
    /// may already hold the key if a concurrent caller just rotated it in.
    /// `Ok(None)` only when nothing has been cached yet.
    pub async fn refresh_for_unknown_kid(&self) -> Result<Option<Arc<JwkSet>>, AuthError> {
        let mut last_forced = self.refresh.lock().await;

        if let Some(at) = *last_forced {
            if at.elapsed() < MIN_FORCED_REFRESH_INTERVAL {
                debug!("skipping forced key refresh (rate limited)");
                return Ok(self.stale().await);
            }
        }

        *last_forced = Some(Instant::now());
        self.fetch_and_store().await.map(Some)
    }

    /// Whatever set is cached, regardless of age.
    pub async fn stale(&self) -> Option<Arc<JwkSet>> {
        self.current.read().await.as_ref().map(|c| c.keys.clone())
    }

    async fn fresh(&self) -> Option<Arc<JwkSet>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.keys.clone())
    }

    // Caller must hold `self.refresh`.
    async fn fetch_and_store(&self) -> Result<Arc<JwkSet>, AuthError> {
        match self.source.fetch().await {
            Ok(set) => {
                let keys = Arc::new(set);
                info!(key_count = keys.keys.len(), "verification keys cached");
                *self.current.write().await = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(err) => {
                warn!(error = %err, "verification key fetch failed; keeping previous set");
                Err(err)
            }
        }
    }
}
