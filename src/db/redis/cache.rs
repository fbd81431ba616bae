use std::time::Duration;

use redis::AsyncCommands;
use redis::Client;

use crate::db::cache::{CacheBackend, CacheError};

/// Creates a Redis client for caching
///
/// Opening the client only parses the URL; connections are established per
/// call, so a Redis instance that comes up after the service still gets used.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed [`CacheBackend`]
#[derive(Clone)]
pub struct RedisBackend {
    redis_client: Client,
}

impl RedisBackend {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    /// Round-trips a PING; used at startup to log whether caching is live
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}

// The ignored tests talk to a live Redis (REDIS_URL, default localhost).
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::cache::{CacheKey, ResultCache};
    use crate::models::ExperimentGroup;

    fn backend() -> RedisBackend {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisBackend::new(create_redis_client(&redis_url).unwrap())
    }

    #[test]
    fn test_create_redis_client_rejects_bad_url() {
        assert!(create_redis_client("not a url").is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_miss() {
        let backend = backend();
        let retrieved = backend.get("rec_control:nonexistent_12345").await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_get_delete() {
        let backend = backend();
        let key = "rec_control:redis_backend_test";

        backend.set(key, "[1,2]", Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.get(key).await.unwrap(), Some("[1,2]".to_string()));

        assert!(backend.delete(key).await.unwrap());
        assert!(!backend.delete(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_result_cache_over_unreachable_server_misses() {
        let backend = RedisBackend::new(create_redis_client("redis://127.0.0.1:1").unwrap());
        let cache = ResultCache::new(Arc::new(backend), Duration::from_millis(200));
        let key = CacheKey::known_user(1, ExperimentGroup::Control);

        assert!(cache.is_enabled());
        cache.set(&key, &vec![1, 2], Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Vec<i64>>(&key).await, None);
        assert!(!cache.invalidate(&key).await);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_reported_as_error() {
        let backend = RedisBackend::new(create_redis_client("redis://127.0.0.1:1").unwrap());
        let result = backend.get("rec_control:1").await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }
}
