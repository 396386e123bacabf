//! Client-side mirror of server query results.

use lru::LruCache;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::debug;

/// Identifies one fetch of one entry. Only the most recent, uncancelled
/// fetch of an entry may write its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct FetchToken(u64);

/// Marks when a speculative write to one entry began. Any later write or
/// fetch of that entry moves it past the mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMark(u64);

#[derive(Debug)]
struct Entry<V> {
    value: Option<V>,
    stale: bool,
    current_fetch: Option<u64>,
    generation: u64,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            value: None,
            stale: true,
            current_fetch: None,
            generation: 0,
        }
    }
}

#[derive(Debug)]
struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    next_generation: u64,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn touch(&mut self, key: &K) -> (&mut Entry<V>, u64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let entry = self.entries.get_or_insert_mut(key.clone(), Entry::default);
        entry.generation = generation;
        (entry, generation)
    }
}

/// Entries are keyed by query identity and evicted least-recently-used first.
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct QueryCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                next_generation: 0,
            }),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        inner.entries.get(key).and_then(|e| e.value.clone())
    }

    /// Missing entries count as stale.
    pub async fn is_stale(&self, key: &K) -> bool {
        let inner = self.inner.lock().await;
        inner.entries.peek(key).map_or(true, |e| e.stale)
    }

    pub async fn is_fetching(&self, key: &K) -> bool {
        let inner = self.inner.lock().await;
        inner
            .entries
            .peek(key)
            .map_or(false, |e| e.current_fetch.is_some())
    }

    /// Overwrites the cached value without touching fetch state.
    pub async fn set(&self, key: &K, value: Option<V>) {
        let mut inner = self.inner.lock().await;
        inner.entries.get_or_insert_mut(key.clone(), Entry::default).value = value;
    }

    /// Stores a value a mutation just returned from the server. The entry is
    /// fresh afterwards and any fetch in flight for it is discarded.
    pub async fn store_fresh(&self, key: &K, value: Option<V>) {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_or_insert_mut(key.clone(), Entry::default);
        entry.value = value;
        entry.stale = false;
        entry.current_fetch = None;
    }

    pub async fn begin_fetch(&self, key: &K) -> FetchToken {
        let mut inner = self.inner.lock().await;
        let (entry, token) = inner.touch(key);
        entry.current_fetch = Some(token);
        FetchToken(token)
    }

    /// Starts a speculative write: cancels any fetch in flight for `key` and
    /// returns the mark `restore` compares against.
    pub async fn begin_write(&self, key: &K) -> WriteMark {
        let mut inner = self.inner.lock().await;
        let (entry, generation) = inner.touch(key);
        if let Some(token) = entry.current_fetch.take() {
            debug!(token, "cancelled in-flight fetch");
        }
        WriteMark(generation)
    }

    /// Puts back a value saved when the write at `since` began. Returns true
    /// when another write or fetch touched the entry in between; the entry is
    /// then marked stale, since the restored value may predate the server.
    pub async fn restore(&self, key: &K, value: Option<V>, since: WriteMark) -> bool {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_or_insert_mut(key.clone(), Entry::default);
        entry.value = value;
        let superseded = entry.generation != since.0;
        if superseded {
            entry.stale = true;
        }
        superseded
    }

    /// Stores a fetch result. Returns false, leaving the entry untouched, when
    /// the fetch was cancelled or superseded.
    pub async fn complete_fetch(&self, key: &K, token: FetchToken, value: Option<V>) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(key) {
            Some(entry) if entry.current_fetch == Some(token.0) => {
                entry.value = value;
                entry.stale = false;
                entry.current_fetch = None;
                true
            }
            _ => {
                debug!(token = token.0, "discarding result of cancelled fetch");
                false
            }
        }
    }

    /// Releases a fetch that failed. The cached value is kept.
    pub async fn abandon_fetch(&self, key: &K, token: FetchToken) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            if entry.current_fetch == Some(token.0) {
                entry.current_fetch = None;
            }
        }
    }

    /// Any fetch in flight for `key` will have its result discarded.
    pub async fn cancel(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            if let Some(token) = entry.current_fetch.take() {
                debug!(token, "cancelled in-flight fetch");
            }
        }
    }

    pub async fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.stale = true;
        }
    }

    pub async fn invalidate_all(&self) {
        let mut inner = self.inner.lock().await;
        for (_, entry) in inner.entries.iter_mut() {
            entry.stale = true;
        }
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        inner.entries.pop(key).and_then(|e| e.value)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs `fetch` under a fresh token and stores its result if the token is
    /// still current when it resolves. Returns whether the result was stored.
    pub async fn fetch_with<F, Fut, E>(&self, key: &K, fetch: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let token = self.begin_fetch(key).await;
        match fetch().await {
            Ok(value) => Ok(self.complete_fetch(key, token, value).await),
            Err(e) => {
                self.abandon_fetch(key, token).await;
                Err(e)
            }
        }
    }
}
