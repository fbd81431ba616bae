pub mod cache;

pub use cache::create_redis_client;
pub use cache::RedisBackend;
