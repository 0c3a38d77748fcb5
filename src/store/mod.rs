//! Key-Value Store
//!
//! The only shared state of the gateway. Every invocation reads and writes
//! through this trait; there is no in-process state across requests.
//!
//! Backends:
//! - `RedisStore`: production, shared across instances
//! - `InMemoryStore`: single process (local runs and tests)

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// String to string mapping with optional per-key expiry.
///
/// No cross-key transactions and no compare-and-swap: concurrent
/// read-modify-write sequences on the same key may lose an update.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key. `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value and expiry.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Shared handle used by the pipeline components
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Connect to Redis when a URL is configured, otherwise fall back to memory
pub async fn connect(redis_url: Option<&str>) -> Result<SharedStore, StoreError> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            tracing::info!("Key-value store: Redis");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("REDIS_URL not set - using in-process store (state is lost on restart)");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
