//! Access-token refresh cache for long-running operations.
//!
//! Keyed by the caller's identity token. A cached access token is handed out only
//! while `now + safety_buffer < expires_at`, so nobody receives a token that dies
//! mid-use. Otherwise one new token is issued and replaces the entry.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::services::auth::issuer::TokenIssuer;
use crate::services::cache::{CacheClient, MemoryCache};

pub const DEFAULT_SAFETY_BUFFER: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct TokenRefresher<C: CacheClient = MemoryCache> {
    issuer: Arc<dyn TokenIssuer>,
    cache: C,
    safety_buffer: Duration,
    prefix: String,
    // One writer per identity token; entries are dropped once nobody waits on them.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: CacheClient> std::fmt::Debug for TokenRefresher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("backend", &self.cache.backend_name())
            .field("safety_buffer", &self.safety_buffer)
            .finish()
    }
}

impl TokenRefresher<MemoryCache> {
    pub fn in_memory(issuer: Arc<dyn TokenIssuer>, safety_buffer: Duration) -> Self {
        Self::new(issuer, MemoryCache::new(), safety_buffer)
    }
}

impl<C: CacheClient> TokenRefresher<C> {
    pub fn new(issuer: Arc<dyn TokenIssuer>, cache: C, safety_buffer: Duration) -> Self {
        Self {
            issuer,
            cache,
            safety_buffer,
            prefix: "authgate:access-token".to_string(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn safety_buffer(&self) -> Duration {
        self.safety_buffer
    }

    /// A valid access token for `identity_token`, issuing a new one when needed.
    pub async fn get_access_token(&self, identity_token: &str) -> Result<String, AuthError> {
        self.get_access_token_at(identity_token, Utc::now()).await
    }

    pub async fn get_access_token_at(
        &self,
        identity_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let key = self.key(identity_token);
        let lock = self.writer_lock(&key).await;

        let result = {
            let _guard = lock.lock().await;
            self.lookup_or_issue(&key, identity_token, now).await
        };

        self.release_writer_lock(&key, lock).await;
        result
    }

    /// Drop the cached access token, e.g. after a downstream service rejected it.
    pub async fn invalidate(&self, identity_token: &str) {
        let key = self.key(identity_token);
        if let Err(e) = self.cache.del(&key).await {
            warn!(error = %e, backend = self.cache.backend_name(), "failed to invalidate cached access token");
        }
    }

    async fn lookup_or_issue(
        &self,
        key: &str,
        identity_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        if let Some(cached) = self.cached(key).await {
            if self.is_fresh(&cached, now) {
                debug!(expires_at = %cached.expires_at, "using cached access token");
                return Ok(cached.access_token);
            }
        }

        let issued = self.issuer.issue_access_token(identity_token).await?;
        let expires_at = expiry(now, issued.expires_in).ok_or_else(|| {
            warn!(expires_in = issued.expires_in, "issuer returned an unusable lifetime");
            AuthError::TokenIssuanceFailure("invalid expires_in".to_string())
        })?;

        debug!(
            expires_in = issued.expires_in,
            expires_at = %expires_at,
            "issued new access token"
        );

        let entry = CachedToken {
            access_token: issued.access_token,
            expires_at,
        };
        self.store(key, &entry, Duration::from_secs(issued.expires_in))
            .await;

        Ok(entry.access_token)
    }

    fn is_fresh(&self, cached: &CachedToken, now: DateTime<Utc>) -> bool {
        let buffer = chrono::Duration::from_std(self.safety_buffer)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        now + buffer < cached.expires_at
    }

    // Backend failures degrade to a cache miss.
    async fn cached(&self, key: &str) -> Option<CachedToken> {
        match self.cache.get_string(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(cached) => Some(cached),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable cached access token");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, backend = self.cache.backend_name(), "refresh cache read failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, entry: &CachedToken, ttl: Duration) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode access token for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set_with_ttl(key, &raw, ttl).await {
            warn!(error = %e, backend = self.cache.backend_name(), "refresh cache write failed");
        }
    }

    // The raw identity token is never used as a storage key.
    fn key(&self, identity_token: &str) -> String {
        let digest = Sha256::digest(identity_token.as_bytes());
        format!("{}:{}", self.prefix, hex::encode(digest))
    }

    async fn writer_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn release_writer_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // map + ours
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(key);
        }
    }
}

// `None` when the lifetime cannot be represented as a timestamp.
fn expiry(now: DateTime<Utc>, expires_in: u64) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(expires_in).ok()?;
    now.checked_add_signed(chrono::Duration::try_seconds(seconds)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::services::auth::issuer::IssuedToken;

    struct CountingIssuer {
        calls: AtomicUsize,
        expires_in: u64,
        delay: Duration,
    }

    impl CountingIssuer {
        fn new(expires_in: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expires_in,
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn issue_access_token(&self, identity_token: &str) -> Result<IssuedToken, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(IssuedToken {
                access_token: format!("{identity_token}-access-{n}"),
                expires_in: self.expires_in,
                token_type: Some("Bearer".into()),
            })
        }
    }

    struct FailingIssuer;

    #[async_trait]
    impl TokenIssuer for FailingIssuer {
        async fn issue_access_token(&self, _: &str) -> Result<IssuedToken, AuthError> {
            Err(AuthError::TokenIssuanceFailure("issuer down".into()))
        }
    }

    #[tokio::test]
    async fn reuses_token_within_freshness_window() {
        let issuer = CountingIssuer::new(3600);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);
        let now = Utc::now();

        let first = refresher.get_access_token_at("id-a", now).await.unwrap();
        let second = refresher
            .get_access_token_at("id-a", now + chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn refreshes_inside_safety_buffer_exactly_once() {
        let issuer = CountingIssuer::new(3600);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);
        let now = Utc::now();

        let first = refresher.get_access_token_at("id-a", now).await.unwrap();

        // 10s before expiry: inside the 30s buffer.
        let later = now + chrono::Duration::seconds(3590);
        let second = refresher.get_access_token_at("id-a", later).await.unwrap();
        let third = refresher.get_access_token_at("id-a", later).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(second, third);
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn identity_tokens_do_not_share_entries() {
        let issuer = CountingIssuer::new(3600);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);

        let a = refresher.get_access_token("id-a").await.unwrap();
        let b = refresher.get_access_token("id-b").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_one_issuance() {
        let issuer = Arc::new(CountingIssuer {
            calls: AtomicUsize::new(0),
            expires_in: 3600,
            delay: Duration::from_millis(50),
        });
        let refresher = Arc::new(TokenRefresher::in_memory(
            issuer.clone(),
            DEFAULT_SAFETY_BUFFER,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let refresher = refresher.clone();
            handles.push(tokio::spawn(async move {
                refresher.get_access_token("id-a").await
            }));
        }

        let mut tokens = Vec::new();
        for h in handles {
            tokens.push(h.await.unwrap().unwrap());
        }

        assert_eq!(issuer.calls(), 1);
        assert!(tokens.iter().all(|t| t == &tokens[0]));
        assert!(refresher.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn issuance_failure_is_surfaced() {
        let refresher = TokenRefresher::in_memory(Arc::new(FailingIssuer), DEFAULT_SAFETY_BUFFER);

        let err = refresher.get_access_token("id-a").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenIssuanceFailure(_)));
    }

    #[tokio::test]
    async fn invalidate_forces_reissue() {
        let issuer = CountingIssuer::new(3600);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);

        refresher.get_access_token("id-a").await.unwrap();
        refresher.invalidate("id-a").await;
        refresher.get_access_token("id-a").await.unwrap();

        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn zero_lifetime_token_is_returned_but_not_reused() {
        let issuer = CountingIssuer::new(0);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);

        let first = refresher.get_access_token("id-a").await.unwrap();
        let second = refresher.get_access_token("id-a").await.unwrap();

        assert_eq!(first, "id-a-access-1");
        assert_eq!(second, "id-a-access-2");
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn unrepresentable_lifetime_is_an_issuance_failure() {
        for expires_in in [u64::MAX, i64::MAX as u64, 1 << 60] {
            let issuer = CountingIssuer::new(expires_in);
            let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);

            let err = refresher.get_access_token("id-a").await.unwrap_err();

            assert_eq!(
                err,
                AuthError::TokenIssuanceFailure("invalid expires_in".into()),
                "expires_in = {expires_in}"
            );
        }
    }

    #[tokio::test]
    async fn long_lifetime_is_cached() {
        let issuer = CountingIssuer::new(10 * 365 * 24 * 3600);
        let refresher = TokenRefresher::in_memory(issuer.clone(), DEFAULT_SAFETY_BUFFER);

        let first = refresher.get_access_token("id-a").await.unwrap();
        let second = refresher.get_access_token("id-a").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entries_do_not_pile_up_across_identity_tokens() {
        let cache = MemoryCache::new();
        let refresher =
            TokenRefresher::new(CountingIssuer::new(0), cache.clone(), DEFAULT_SAFETY_BUFFER);

        for i in 0..1000 {
            refresher.get_access_token(&format!("id-{i}")).await.unwrap();
        }

        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn storage_key_does_not_contain_the_credential() {
        let refresher = TokenRefresher::in_memory(CountingIssuer::new(1), DEFAULT_SAFETY_BUFFER);
        let key = refresher.key("secret-identity-token");

        assert!(!key.contains("secret-identity-token"));
        assert!(key.starts_with("authgate:access-token:"));
    }
}
