pub mod client;
pub mod memory;
pub mod valkey;

use async_trait::async_trait;
use std::time::Duration;

pub use client::{CacheClient, CacheError, CacheResult};
pub use memory::MemoryCache;
pub use valkey::ValkeyClient;

/// Backend picked at start-up from configuration.
#[derive(Clone, Debug)]
pub enum AnyCache {
    Memory(MemoryCache),
    Valkey(ValkeyClient),
}

#[async_trait]
impl CacheClient for AnyCache {
    fn backend_name(&self) -> &'static str {
        match self {
            AnyCache::Memory(c) => c.backend_name(),
            AnyCache::Valkey(c) => c.backend_name(),
        }
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            AnyCache::Memory(c) => c.get_string(key).await,
            AnyCache::Valkey(c) => c.get_string(key).await,
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            AnyCache::Memory(c) => c.set_with_ttl(key, value, ttl).await,
            AnyCache::Valkey(c) => c.set_with_ttl(key, value, ttl).await,
        }
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        match self {
            AnyCache::Memory(c) => c.del(key).await,
            AnyCache::Valkey(c) => c.del(key).await,
        }
    }
}
