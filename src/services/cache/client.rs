//! Storage behind the access-token refresh cache.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Backend failures. The refresh cache treats any of these as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unreachable: {0}")]
    Connect(String),
    #[error("cache command failed: {0}")]
    Command(String),
}

/// String key/value store with per-entry expiry.
///
/// Handles are cloned into every refresher, so cloning must be cheap.
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    /// Short backend label for log fields.
    fn backend_name(&self) -> &'static str;

    /// Value under `key`; an expired entry reads as `None`.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    /// Insert or overwrite, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Number of entries removed (0 or 1).
    async fn del(&self, key: &str) -> CacheResult<u64>;
}
