pub mod cache;
pub mod postgres;
pub mod redis;

pub use self::cache::{CacheBackend, CacheError, CacheKey, ResultCache};
pub use self::postgres::{create_pool, PgMetadataStore};
pub use self::redis::{create_redis_client, RedisBackend};
