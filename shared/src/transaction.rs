use std::hash::Hash;

use crate::cache::{QueryCache, WriteMark};

/// A speculative edit of one cache entry. Consumed by `commit` or `rollback`.
#[must_use = "a transaction must be committed or rolled back"]
pub struct CacheTransaction<'a, K: Hash + Eq, V> {
    cache: &'a QueryCache<K, V>,
    key: K,
    snapshot: Option<V>,
    mark: WriteMark,
}

impl<'a, K, V> CacheTransaction<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Cancels any fetch of `key` in flight, then snapshots the entry.
    pub async fn begin(cache: &'a QueryCache<K, V>, key: K) -> Self {
        let mark = cache.begin_write(&key).await;
        let snapshot = cache.get(&key).await;
        Self {
            cache,
            key,
            snapshot,
            mark,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn snapshot(&self) -> Option<&V> {
        self.snapshot.as_ref()
    }

    /// Replaces the entry with `transform` of its current value.
    pub async fn apply(&self, transform: impl FnOnce(Option<V>) -> Option<V>) {
        let current = self.cache.get(&self.key).await;
        self.cache.set(&self.key, transform(current)).await;
    }

    /// Keeps the speculative value until the next fetch replaces it.
    pub async fn commit(self) {
        self.cache.invalidate(&self.key).await;
    }

    /// Puts the snapshot back exactly as it was taken. Returns true when the
    /// entry was written or fetched after `begin`: the snapshot may then miss
    /// changes the server already has, so the entry is left stale.
    pub async fn rollback(self) -> bool {
        self.cache.restore(&self.key, self.snapshot, self.mark).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn cache() -> QueryCache<u8, Vec<u32>> {
        QueryCache::new(NonZeroUsize::new(8).unwrap())
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let cache = cache();
        cache.set(&1, Some(vec![1, 2, 3])).await;

        let tx = CacheTransaction::begin(&cache, 1).await;
        tx.apply(|v| v.map(|mut v| {
            v.push(4);
            v
        }))
        .await;
        assert_eq!(cache.get(&1).await, Some(vec![1, 2, 3, 4]));

        assert!(!tx.rollback().await);
        assert_eq!(cache.get(&1).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_rollback_after_newer_write_marks_stale() {
        let cache = cache();
        let token = cache.begin_fetch(&1).await;
        cache.complete_fetch(&1, token, Some(vec![1])).await;

        let slow = CacheTransaction::begin(&cache, 1).await;
        slow.apply(|_| Some(vec![1, 2])).await;

        let fast = CacheTransaction::begin(&cache, 1).await;
        fast.apply(|v| v.map(|mut v| {
            v.push(3);
            v
        }))
        .await;
        fast.commit().await;
        let token = cache.begin_fetch(&1).await;
        cache.complete_fetch(&1, token, Some(vec![1, 3])).await;
        assert!(!cache.is_stale(&1).await);

        assert!(slow.rollback().await);
        assert_eq!(cache.get(&1).await, Some(vec![1]));
        assert!(cache.is_stale(&1).await);
    }

    #[tokio::test]
    async fn test_rollback_of_cold_entry_stays_empty() {
        let cache = cache();
        let tx = CacheTransaction::begin(&cache, 1).await;
        assert!(tx.snapshot().is_none());
        tx.apply(|v| Some(v.unwrap_or_default())).await;
        tx.rollback().await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn test_commit_keeps_value_and_marks_stale() {
        let cache = cache();
        let token = cache.begin_fetch(&1).await;
        cache.complete_fetch(&1, token, Some(vec![1])).await;

        let tx = CacheTransaction::begin(&cache, 1).await;
        tx.apply(|_| Some(vec![])).await;
        tx.commit().await;

        assert_eq!(cache.get(&1).await, Some(vec![]));
        assert!(cache.is_stale(&1).await);
    }

    #[tokio::test]
    async fn test_begin_cancels_in_flight_fetch() {
        let cache = cache();
        cache.set(&1, Some(vec![1])).await;
        let token = cache.begin_fetch(&1).await;

        let tx = CacheTransaction::begin(&cache, 1).await;
        tx.apply(|_| Some(vec![2])).await;

        assert!(!cache.complete_fetch(&1, token, Some(vec![9])).await);
        assert_eq!(cache.get(&1).await, Some(vec![2]));
        tx.commit().await;
    }
}
