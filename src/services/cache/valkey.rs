use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

/// Shared refresh-cache table in Valkey/Redis.
///
/// Lets several replicas reuse one issued access token per identity token.
/// Expiry is delegated to the server (`PSETEX`).
#[derive(Clone)]
pub struct ValkeyClient {
    conn: ConnectionManager,
}

impl std::fmt::Debug for ValkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may carry a password
        f.debug_struct("ValkeyClient").finish_non_exhaustive()
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Command(e.to_string())
    }
}

fn connect_error(e: redis::RedisError) -> CacheError {
    CacheError::Connect(e.to_string())
}

impl ValkeyClient {
    /// Connect to `redis://[:password@]host:port[/db]`.
    ///
    /// The connection manager reconnects on its own after start-up.
    pub async fn new(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(connect_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(connect_error)?;

        info!("connected to shared refresh cache");
        Ok(Self { conn })
    }
}

// PSETEX rejects 0; sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    // Valkey rejects expiries beyond i64 milliseconds.
    let cap = i64::MAX as u64;
    u64::try_from(ttl.as_millis())
        .map_or(cap, |ms| ms.min(cap))
        .max(1)
}

#[async_trait]
impl CacheClient for ValkeyClient {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let () = conn.pset_ex(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.del(key).await?)
    }
}
