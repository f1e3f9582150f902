use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Shared in-memory map with an optional time-to-live.
///
/// Clones share the same storage. Entries without a TTL never expire, which
/// suits immutable facts such as token decimals.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, Entry<V>>>>,
    ttl: Option<Duration>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(Some(ttl))
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Stores `value` unless a fresh entry exists; returns whichever value is cached.
    pub async fn insert_if_absent(&self, key: K, value: V) -> V {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&key).filter(|entry| self.is_fresh(entry)) {
            return existing.value.clone();
        }
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        value
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
