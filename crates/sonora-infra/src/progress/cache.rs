use bytes::Bytes;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sonora_core::UploadProgress;

use super::store::TtlStore;

#[derive(Debug, Clone, Copy)]
struct Counters {
    received: u64,
    total: u64,
}

/// Process-wide record of bytes received per in-flight upload.
///
/// Constructed once and shared by handle; clones see the same entries.
/// Entries expire a fixed time after their last write and are never deleted
/// explicitly.
#[derive(Clone)]
pub struct UploadProgressCache {
    store: TtlStore<String, Counters>,
}

impl UploadProgressCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: TtlStore::new(ttl),
        }
    }

    pub fn with_shards(ttl: Duration, shard_count: usize) -> Self {
        Self {
            store: TtlStore::with_shards(ttl, shard_count),
        }
    }

    /// Add `chunk.len()` to the bytes received for `unique_id` and return the chunk untouched.
    ///
    /// `total_expected` replaces the stored total; 0 means the total is not known yet.
    pub async fn record_chunk(&self, unique_id: &str, chunk: Bytes, total_expected: u64) -> Bytes {
        let chunk_len = chunk.len() as u64;
        let counters = self
            .store
            .update(unique_id.to_string(), |previous| {
                let received = previous
                    .map(|c| c.received)
                    .unwrap_or(0)
                    .saturating_add(chunk_len);
                if total_expected > 0 && received > total_expected {
                    tracing::warn!(
                        unique_id = %unique_id,
                        bytes_received = received,
                        bytes_total = total_expected,
                        "Upload exceeded declared size, clamping progress"
                    );
                    Counters {
                        received: total_expected,
                        total: total_expected,
                    }
                } else {
                    Counters {
                        received,
                        total: total_expected,
                    }
                }
            })
            .await;

        tracing::trace!(
            unique_id = %unique_id,
            chunk_len = chunk_len,
            bytes_received = counters.received,
            bytes_total = counters.total,
            "Upload chunk recorded"
        );

        chunk
    }

    /// Mark `unique_id` as fully received.
    pub async fn record_complete(&self, unique_id: &str, total_size: u64) {
        self.store
            .insert(
                unique_id.to_string(),
                Counters {
                    received: total_size,
                    total: total_size,
                },
            )
            .await;

        tracing::debug!(
            unique_id = %unique_id,
            bytes_total = total_size,
            "Upload complete"
        );
    }

    /// Last known progress, or `None` if the upload is unknown or its entry expired.
    pub async fn query(&self, unique_id: &str) -> Option<UploadProgress> {
        self.store
            .get(&unique_id.to_string())
            .await
            .map(|c| UploadProgress {
                unique_id: unique_id.to_string(),
                bytes_received: c.received,
                bytes_total: c.total,
            })
    }

    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }

    /// Spawn a background task that purges expired entries every `interval`
    /// until `cancel_token` is cancelled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        let mut ticker = tokio::time::interval(interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Upload progress sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired().await;
                        if removed > 0 {
                            tracing::debug!(
                                removed = removed,
                                "Purged expired upload progress entries"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> UploadProgressCache {
        UploadProgressCache::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_record_chunk_returns_chunk_unmodified() {
        let cache = cache();
        let chunk = Bytes::from_static(b"RIFF....WAVE");
        let returned = cache.record_chunk("up-1", chunk.clone(), 100).await;
        assert_eq!(returned, chunk);
    }

    #[tokio::test]
    async fn test_bytes_received_is_sum_of_chunks() {
        let cache = cache();
        let sizes = [10usize, 0, 250, 1, 739];
        for size in sizes {
            cache
                .record_chunk("up-1", Bytes::from(vec![0u8; size]), 1000)
                .await;
        }

        let progress = cache.query("up-1").await.unwrap();
        assert_eq!(progress.bytes_received, 1000);
        assert_eq!(progress.bytes_total, 1000);
        assert!(progress.is_complete());
    }

    #[tokio::test]
    async fn test_bytes_received_never_exceeds_known_total() {
        let cache = cache();
        cache
            .record_chunk("up-1", Bytes::from(vec![0u8; 80]), 100)
            .await;
        cache
            .record_chunk("up-1", Bytes::from(vec![0u8; 80]), 100)
            .await;

        let progress = cache.query("up-1").await.unwrap();
        assert_eq!(progress.bytes_received, 100);
        assert!(progress.bytes_received <= progress.bytes_total);
    }

    #[tokio::test]
    async fn test_unknown_total_accumulates_without_clamping() {
        let cache = cache();
        cache.record_chunk("up-1", Bytes::from(vec![0u8; 64]), 0).await;
        cache.record_chunk("up-1", Bytes::from(vec![0u8; 64]), 0).await;

        let progress = cache.query("up-1").await.unwrap();
        assert_eq!(progress.bytes_received, 128);
        assert_eq!(progress.bytes_total, 0);
        assert_eq!(progress.percent(), None);
    }

    #[tokio::test]
    async fn test_record_complete_sets_both_counters() {
        let cache = cache();
        cache.record_chunk("up-1", Bytes::from(vec![0u8; 10]), 0).await;
        cache.record_complete("up-1", 4096).await;

        let progress = cache.query("up-1").await.unwrap();
        assert_eq!(progress.bytes_received, 4096);
        assert_eq!(progress.bytes_total, 4096);
    }

    #[tokio::test]
    async fn test_independent_keys() {
        let cache = cache();
        cache.record_chunk("a", Bytes::from(vec![0u8; 5]), 10).await;
        cache.record_chunk("b", Bytes::from(vec![0u8; 7]), 10).await;

        assert_eq!(cache.query("a").await.unwrap().bytes_received, 5);
        assert_eq!(cache.query("b").await.unwrap().bytes_received, 7);
        assert!(cache.query("c").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_not_written_within_ttl_is_not_found() {
        let cache = cache();
        cache.record_chunk("up-1", Bytes::from(vec![0u8; 5]), 10).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.record_chunk("up-1", Bytes::from(vec![0u8; 5]), 10).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.query("up-1").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.query("up-1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_until_cancelled() {
        let cache = UploadProgressCache::new(Duration::from_secs(5));
        cache.record_complete("up-1", 10).await;
        assert_eq!(cache.len().await, 1);

        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(1), token.clone());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(cache.len().await, 0);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_writers_to_distinct_keys() {
        let cache = cache();
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("up-{}", i);
                for _ in 0..10 {
                    cache.record_chunk(&id, Bytes::from(vec![0u8; 3]), 30).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..32 {
            let progress = cache.query(&format!("up-{}", i)).await.unwrap();
            assert_eq!(progress.bytes_received, 30);
        }
    }
}
