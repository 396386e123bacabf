use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use tracing::{info, warn};

use crate::cache::QueryCache;
use crate::transaction::CacheTransaction;

/// A remote failure after the speculative edit was undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationError<E> {
    pub error: E,
    /// The entry was restored to a value older than another write or fetch
    /// that happened meanwhile, and must be refetched.
    pub needs_refetch: bool,
}

impl<E> MutationError<E> {
    /// A failure that left the cache untouched.
    pub fn settled(error: E) -> Self {
        Self {
            error,
            needs_refetch: false,
        }
    }
}

/// Applies `transform` to the cached entry, then awaits `remote`. On success
/// the entry is marked stale for the caller to refetch; on failure it is
/// restored to the value it had before `transform` ran.
pub async fn run<K, V, T, E, Fut>(
    cache: &QueryCache<K, V>,
    key: K,
    label: &'static str,
    transform: impl FnOnce(Option<V>) -> Option<V>,
    remote: Fut,
) -> Result<T, MutationError<E>>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Debug,
    Fut: Future<Output = Result<T, E>>,
{
    let tx = CacheTransaction::begin(cache, key).await;
    tx.apply(transform).await;

    match remote.await {
        Ok(value) => {
            tx.commit().await;
            info!(mutation = label, "optimistic mutation settled");
            Ok(value)
        }
        Err(error) => {
            let needs_refetch = tx.rollback().await;
            warn!(
                mutation = label,
                error = ?error,
                needs_refetch,
                "optimistic mutation rolled back"
            );
            Err(MutationError {
                error,
                needs_refetch,
            })
        }
    }
}
