use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use crate::models::ExperimentGroup;

/// Keys for cached result sets
///
/// Rendered as `<strategy>:<subject>`. Cold-start requests have no subject and
/// are never cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    KnownUser {
        user_id: i64,
        group: ExperimentGroup,
    },
}

impl CacheKey {
    pub fn known_user(user_id: i64, group: ExperimentGroup) -> Self {
        CacheKey::KnownUser { user_id, group }
    }

    /// Every key a subject's results may live under
    pub fn all_for_user(user_id: i64) -> [CacheKey; 2] {
        [
            CacheKey::known_user(user_id, ExperimentGroup::Control),
            CacheKey::known_user(user_id, ExperimentGroup::Treatment),
        ]
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::KnownUser { user_id, group } => write!(f, "rec_{}:{}", group, user_id),
        }
    }
}

/// Failures of the cache backend, kept distinct from "key not found"
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache call timed out")]
    Timeout,
}

/// Raw key/value store behind [`ResultCache`]
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// `Ok(None)` means the key is absent; `Err` means the store could not answer
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a key was actually removed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Fail-open result cache
///
/// Any backend failure (connection, timeout, undecodable payload) is logged
/// and reported to the caller as a miss, so a cache outage never reaches a
/// user. Concurrent misses for one key may each write; last write wins.
#[derive(Clone)]
pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    timeout: Duration,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// A cache that always misses
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let key = key.to_string();

        let raw = match self.bounded(backend.get(&key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, computing fresh result");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = key.to_string();

        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                return;
            }
        };

        match self.bounded(backend.set(&key, &json, ttl)).await {
            Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached result"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache write failed"),
        }
    }

    /// Removes an entry; `false` when nothing was removed or the store is down
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let key = key.to_string();

        match self.bounded(backend.delete(&key)).await {
            Ok(deleted) => {
                if deleted {
                    tracing::info!(key = %key, "Invalidated cache entry");
                }
                deleted
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(CacheError::Timeout))
    }
}
