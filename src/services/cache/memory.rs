use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::services::cache::client::{CacheClient, CacheResult};

// `None` deadline: the TTL does not fit in an `Instant`, so the entry never expires.
type Entry = (String, Option<Instant>);

fn is_live(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_none_or(|d| now < d)
}

/// In-process cache.
///
/// An expired entry is dropped when it is read, and every write sweeps out all
/// expired entries so keys that are never read again do not accumulate.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some((value, deadline)) if is_live(*deadline, Instant::now()) => {
                Ok(Some(value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let deadline = now.checked_add(ttl);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, deadline)| is_live(*deadline, now));
        entries.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        Ok(self.entries.lock().await.remove(key).map_or(0, |_| 1))
    }
}
