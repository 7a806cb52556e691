pub mod memory;
pub mod pg_store;
pub mod postgres;
pub mod redis;
pub mod store;

pub use memory::InMemoryWatchlistStore;
pub use pg_store::PostgresWatchlistStore;
pub use postgres::{create_pool, run_migrations};
pub use self::redis::create_redis_client;
pub use self::redis::Cache;
pub use self::redis::CacheKey;
pub use store::WatchlistStore;
