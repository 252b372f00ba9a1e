use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

/// Key prefix for cached scan results.
const RESULT_KEY_PREFIX: &str = "vision:result:";

/// Fast, expiring result lookup. Eviction is opaque to callers: an expired
/// or evicted entry is indistinguishable from one never written.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn put(&self, task_id: Uuid, payload: &str) -> Result<(), CacheError>;
    async fn get(&self, task_id: Uuid) -> Result<Option<String>, CacheError>;
}

/// Redis-backed cache with a fixed TTL per entry.
pub struct RedisResultCache {
    client: redis::Client,
    ttl: Duration,
}

impl RedisResultCache {
    pub fn new(redis_url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client, ttl })
    }

    fn key(task_id: Uuid) -> String {
        format!("{RESULT_KEY_PREFIX}{task_id}")
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn put(&self, task_id: Uuid, payload: &str) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;
        conn.set_ex::<_, _, ()>(Self::key(task_id), payload, self.ttl.as_secs())
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<String>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;
        let payload: Option<String> = conn
            .get(Self::key(task_id))
            .await
            .map_err(CacheError::Redis)?;
        Ok(payload)
    }
}

/// In-process cache with the same expiry semantics, for tests and
/// infrastructure-free runs.
#[derive(Default)]
pub struct MemoryResultCache {
    entries: Mutex<HashMap<Uuid, (String, Option<Instant>)>>,
    ttl: Option<Duration>,
}

impl MemoryResultCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop every entry, expired or not.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn put(&self, task_id: Uuid, payload: &str) -> Result<(), CacheError> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(task_id, (payload.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&task_id) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                entries.remove(&task_id);
                Ok(None)
            }
            Some((payload, _)) => Ok(Some(payload.clone())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trips() {
        let cache = MemoryResultCache::new(None);
        let id = Uuid::new_v4();

        assert_eq!(cache.get(id).await.unwrap(), None);
        cache.put(id, "payload").await.unwrap();
        assert_eq!(cache.get(id).await.unwrap().as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = MemoryResultCache::new(Some(Duration::ZERO));
        let id = Uuid::new_v4();

        cache.put(id, "payload").await.unwrap();
        assert_eq!(cache.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_forces_misses() {
        let cache = MemoryResultCache::new(Some(Duration::from_secs(60)));
        let id = Uuid::new_v4();

        cache.put(id, "payload").await.unwrap();
        cache.clear();
        assert_eq!(cache.get(id).await.unwrap(), None);
    }
}
