//! Key-value cache abstraction.
//!
//! Operations are `Set`/`Get`/`Del`/`Close` over JSON-encoded values with a
//! per-key TTL; a missing key is a normal `None`, never an error. A
//! Redis-backed implementation is the primary target; an in-memory
//! implementation is provided for tests so the hard components (SIWE
//! consume-on-read, service-auth replay detection, rate limiting) can be
//! exercised without a live Redis instance.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A key-value store with TTL and atomic consume-on-read semantics.
///
/// Implementations store raw strings; callers are responsible for
/// JSON-encoding the values they put in, matching the corpus's convention
/// of keeping the cache layer value-agnostic.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns `None` on a missing key rather than an error.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Atomically read and delete a key in one round trip. Used by the SIWE
    /// engine's consume-on-read fetch so that two concurrent authentications
    /// against the same challenge cannot both observe it.
    async fn get_del(&self, key: &str) -> Result<Option<String>>;

    /// Increment a counter keyed by `key`, setting its expiry to `window` on
    /// the first increment within the window. Returns the post-increment
    /// count. Backs the rate-limit registry's distributed counters.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64>;

    /// Release any held connection resources. A no-op for in-memory caches.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
}

/// Redis-backed [`Cache`]. Shares a single multiplexed connection across all
/// concurrent callers; cloning the connection handle is cheap.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(config: &RedisCacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        // GETDEL (Redis >= 6.2) makes the read-then-delete atomic.
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, window.as_secs().max(1) as i64).await?;
        }
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`Cache`] for tests. Consume-on-read is already atomic within
/// a process since the whole operation holds the mutex.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).filter(|e| Self::live(e)).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.remove(key) {
            Some(e) if Self::live(&e) => Ok(Some(e.value)),
            _ => Ok(None),
        }
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let count = match entries.get(key) {
            Some(e) if e.expires_at > now => {
                let next: u64 = e.value.parse().unwrap_or(0) + 1;
                next
            }
            _ => 1,
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at: now + window,
            },
        );
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_none_not_error() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_del_consumes_exactly_once() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_del("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.get_del("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_resets_after_window() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("r", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.incr("r", Duration::from_secs(60)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn del_removes_key() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
