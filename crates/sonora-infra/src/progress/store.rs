use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    written_at: Instant,
}

/// Sharded key-value store whose entries expire a fixed time after their last write.
///
/// Keys are spread over independent mutex-guarded shards so writers to
/// different keys rarely contend. Expired entries are invisible to readers
/// immediately and are physically removed by [`TtlStore::purge_expired`].
pub struct TtlStore<K, V> {
    shards: Vec<Arc<Mutex<HashMap<K, Entry<V>>>>>,
    shard_count: usize,
    ttl: Duration,
}

impl<K, V> Clone for TtlStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            shards: self.shards.clone(),
            shard_count: self.shard_count,
            ttl: self.ttl,
        }
    }
}

impl<K, V> TtlStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a store with the default 16 shards.
    pub fn new(ttl: Duration) -> Self {
        Self::with_shards(ttl, 16)
    }

    pub fn with_shards(ttl: Duration, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            shard_count,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.duration_since(entry.written_at) < self.ttl
    }

    /// Return the live value for `key`, if any.
    pub async fn get(&self, key: &K) -> Option<V> {
        let shard = &self.shards[self.shard_index(key)];
        let entries = shard.lock().await;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, refreshing its expiry.
    pub async fn insert(&self, key: K, value: V) {
        let shard = &self.shards[self.shard_index(&key)];
        let mut entries = shard.lock().await;
        entries.insert(
            key,
            Entry {
                value,
                written_at: Instant::now(),
            },
        );
    }

    /// Atomically replace the value under `key` with `f(previous)`, refreshing its expiry.
    ///
    /// `previous` is `None` when the key is absent or expired.
    pub async fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let shard = &self.shards[self.shard_index(&key)];
        let mut entries = shard.lock().await;
        let now = Instant::now();
        let previous = entries
            .get(&key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| &entry.value);
        let value = f(previous);
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                written_at: now,
            },
        );
        value
    }

    /// Remove expired entries from every shard and return how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut entries = shard.lock().await;
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|_, entry| now.duration_since(entry.written_at) < self.ttl);
            removed += before - entries.len();
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store: TtlStore<String, u64> = TtlStore::new(Duration::from_secs(60));
        store.insert("a".to_string(), 1).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get(&"a".to_string()).await, Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get(&"a".to_string()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_refreshes_expiry() {
        let store: TtlStore<String, u64> = TtlStore::new(Duration::from_secs(10));
        store.update("a".to_string(), |_| 1).await;

        tokio::time::advance(Duration::from_secs(8)).await;
        let value = store
            .update("a".to_string(), |prev| prev.copied().unwrap_or(0) + 1)
            .await;
        assert_eq!(value, 2);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get(&"a".to_string()).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_after_expiry_starts_fresh() {
        let store: TtlStore<String, u64> = TtlStore::new(Duration::from_secs(10));
        store.insert("a".to_string(), 5).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let value = store
            .update("a".to_string(), |prev| prev.copied().unwrap_or(0) + 1)
            .await;
        assert_eq!(value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_only_stale_entries() {
        let store: TtlStore<u32, u32> = TtlStore::with_shards(Duration::from_secs(10), 4);
        for key in 0..8 {
            store.insert(key, key).await;
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        store.insert(100, 100).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.len().await, 9);
        assert_eq!(store.purge_expired().await, 8);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&100).await, Some(100));
    }

    #[tokio::test]
    async fn test_zero_shards_falls_back_to_one() {
        let store: TtlStore<u32, u32> = TtlStore::with_shards(Duration::from_secs(1), 0);
        store.insert(1, 1).await;
        assert!(!store.is_empty().await);
    }
}
