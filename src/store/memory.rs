//! In-process store
//!
//! Moka cache with a per-entry expiry policy, so a value written with a TTL
//! disappears on its own while values without one live until deleted.

use super::KeyValueStore;
use crate::error::StoreError;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: u64 = 100_000;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    ttl: Option<Duration>,
}

/// Expiry follows the TTL of the latest write
struct WriteTtl;

impl Expiry<String, StoredValue> for WriteTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Single-process key-value store
#[derive(Clone)]
pub struct InMemoryStore {
    cache: Cache<String, StoredValue>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(WriteTtl)
            .build();
        Self { cache }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.cache
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();

        assert!(store.get("k").await.unwrap().is_none());

        store.put("k", "v1", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));

        store.put("k", "v2", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());

        // Deleting again is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expires_entry() {
        let store = InMemoryStore::new();

        store.put("short", "x", Some(Duration::from_millis(50))).await.unwrap();
        store.put("forever", "y", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_rewrite_without_ttl_clears_expiry() {
        let store = InMemoryStore::new();

        store.put("k", "a", Some(Duration::from_millis(50))).await.unwrap();
        store.put("k", "b", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }
}
