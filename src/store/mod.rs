pub mod disk;
pub mod memory;
pub mod portfolio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// A named bucket of byte values keyed by string. Entries written with a TTL
/// are not returned once it elapses.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
    /// Returns whether a live entry was removed.
    async fn remove(&self, key: &str) -> Result<bool>;
    /// Keys of live entries, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Hands out named collections, either on disk (fjall) or in memory.
pub struct KeyValueStore {
    collections: Mutex<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path.join("store"))
            .open()
            .with_context(|| format!("Failed to open data store at {}", path.display()))?;
        debug!("Opened data store at {}", path.display());

        Ok(Self {
            collections: Mutex::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = collections.get(name) {
            return Ok(Arc::clone(existing));
        }

        let collection: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(keyspace) => {
                let partition = keyspace
                    .open_partition(name, PartitionCreateOptions::default())
                    .with_context(|| format!("Failed to open collection: {name}"))?;
                Arc::new(DiskCollection::new(Arc::clone(keyspace), partition))
            }
            None => Arc::new(MemoryCollection::new()),
        };
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}
