use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    // insertion sequence -> key, oldest first
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

/// In-memory cache with two eviction policies: entries older than `ttl` are
/// never returned, and once more than `max_entries` are held the
/// oldest-inserted entries are dropped.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    state: Mutex<CacheState<K, V>>,
    inflight: std::sync::Mutex<HashMap<K, Arc<Mutex<()>>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            inflight: std::sync::Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().await;
        let expired = match state.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                debug!("Cache HIT for key: {:?}", key);
                return Some(entry.value.clone());
            }
            Some(entry) => Some(entry.seq),
            None => None,
        };

        if let Some(seq) = expired {
            debug!("Cache entry expired for key: {:?}", key);
            state.entries.remove(key);
            state.order.remove(&seq);
        } else {
            debug!("Cache MISS for key: {:?}", key);
        }
        None
    }

    pub async fn put(&self, key: K, value: V) {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            seq,
        };
        if let Some(previous) = state.entries.insert(key.clone(), entry) {
            state.order.remove(&previous.seq);
        }
        debug!("Cache PUT for key: {:?}", key);
        state.order.insert(seq, key);

        while state.entries.len() > self.max_entries {
            match state.order.pop_first() {
                Some((_, oldest)) => {
                    debug!("Cache EVICT for key: {:?}", oldest);
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub async fn remove(&self, key: &K) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.remove(key) {
            state.order.remove(&entry.seq);
            debug!("Cache REMOVE for key: {:?}", key);
        }
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.order.clear();
        debug!("Cache CLEAR");
    }

    /// Number of held entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every entry older than the TTL.
    pub async fn purge_expired(&self) {
        let mut state = self.state.lock().await;
        let ttl = self.ttl;
        let expired: Vec<(K, u64)> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= ttl)
            .map(|(key, entry)| (key.clone(), entry.seq))
            .collect();
        for (key, seq) in expired {
            state.entries.remove(&key);
            state.order.remove(&seq);
        }
    }

    /// Returns the fresh cached value for `key`, or runs `fetch` and caches a
    /// successful result. Concurrent callers for the same key wait for the
    /// first fetch instead of issuing their own.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let gate = {
            let mut inflight = self
                .inflight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = gate.lock().await;
            match self.get(&key).await {
                Some(value) => Ok(value),
                None => match fetch().await {
                    Ok(value) => {
                        self.put(key.clone(), value.clone()).await;
                        Ok(value)
                    }
                    Err(e) => Err(e),
                },
            }
        };

        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(&gate) <= 2 {
            inflight.remove(&key);
        }

        result
    }
}
