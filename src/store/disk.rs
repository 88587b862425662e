use crate::store::KeyValueCollection;
use anyhow::{Result, bail};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

// Stored values are prefixed with the expiry as big-endian unix millis, 0 for none.
const EXPIRY_PREFIX_LEN: usize = 8;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn encode(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expires_at = ttl.map_or(0, |d| now_millis().saturating_add(d.as_millis() as u64));
    let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
    bytes.extend_from_slice(&expires_at.to_be_bytes());
    bytes.extend_from_slice(value);
    bytes
}

/// Splits a stored value into its payload, or `None` once expired.
fn decode(bytes: &[u8]) -> Result<Option<&[u8]>> {
    if bytes.len() < EXPIRY_PREFIX_LEN {
        bail!("Stored value is truncated ({} bytes)", bytes.len());
    }
    let (prefix, payload) = bytes.split_at(EXPIRY_PREFIX_LEN);
    let mut expiry = [0u8; EXPIRY_PREFIX_LEN];
    expiry.copy_from_slice(prefix);
    let expires_at = u64::from_be_bytes(expiry);

    if expires_at != 0 && expires_at <= now_millis() {
        return Ok(None);
    }
    Ok(Some(payload))
}

pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(bytes) = self.partition.get(key)? else {
            debug!("Store MISS for key: {}", key);
            return Ok(None);
        };

        match decode(&bytes)? {
            Some(payload) => {
                debug!("Store HIT for key: {}", key);
                Ok(Some(payload.to_vec()))
            }
            None => {
                debug!("Store entry expired for key: {}", key);
                self.partition.remove(key)?;
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.partition.insert(key, encode(&value, ttl))?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Store PUT for key: {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let existed = match self.partition.get(key)? {
            Some(bytes) => decode(&bytes)?.is_some(),
            None => false,
        };
        self.partition.remove(key)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Store REMOVE for key: {}", key);
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.partition.iter() {
            let (key, value) = item?;
            if decode(&value)?.is_some() {
                keys.push(String::from_utf8_lossy(&key).into_owned());
            }
        }
        Ok(keys)
    }
}
