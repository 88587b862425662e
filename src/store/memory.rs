use crate::store::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > Instant::now())
    }
}

#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        match inner.get(key) {
            Some(entry) if entry.is_live() => {
                debug!("Store HIT for key: {}", key);
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                debug!("Store entry expired for key: {}", key);
                inner.remove(key);
                Ok(None)
            }
            None => {
                debug!("Store MISS for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        self.inner
            .lock()
            .await
            .insert(key.to_string(), StoredValue { value, expires_at });
        debug!("Store PUT for key: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.inner.lock().await.remove(key);
        debug!("Store REMOVE for key: {}", key);
        Ok(removed.is_some_and(|entry| entry.is_live()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .iter()
            .filter(|(_, entry)| entry.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_memory_get_put() {
        let collection = MemoryCollection::new();

        assert!(collection.get("key1").await.unwrap().is_none());
        collection.put("key1", b"123".to_vec(), None).await.unwrap();

        assert_eq!(collection.get("key1").await.unwrap(), Some(b"123".to_vec()));
        assert!(collection.get("key2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_ttl_expiration() {
        let collection = MemoryCollection::new();

        collection
            .put("key1", b"123".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(collection.get("key1").await.unwrap().is_some());

        sleep(Duration::from_millis(20)).await;
        assert!(collection.get("key1").await.unwrap().is_none());
        assert!(collection.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_remove_and_keys() {
        let collection = MemoryCollection::new();

        collection.put("b", vec![2], None).await.unwrap();
        collection.put("a", vec![1], None).await.unwrap();
        assert_eq!(collection.keys().await.unwrap(), vec!["a", "b"]);

        assert!(collection.remove("a").await.unwrap());
        assert!(!collection.remove("a").await.unwrap());
        assert_eq!(collection.keys().await.unwrap(), vec!["b"]);
    }
}
