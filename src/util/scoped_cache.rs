use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Scoped cache that can be used in async context.
///
/// Each key owns a `OnceCell`, so concurrent requests for the same key run the
/// computation at most once and the rest wait for its result. A failed
/// computation leaves the cell empty and the next caller retries it.
pub struct ScopedCache<K, V>
where
    K: Eq + Hash,
{
    cache: Arc<RwLock<HashMap<K, Arc<OnceCell<V>>>>>,
}

impl<K, V> Default for ScopedCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> Clone for ScopedCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<K, V> ScopedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        if let Some(cell) = self.cache.read().await.get(key) {
            return cell.clone();
        }
        let mut cache = self.cache.write().await;
        cache.entry(key.clone()).or_default().clone()
    }

    /// Cached value for `key`, computing it with `init` on a miss.
    ///
    /// Returns the value and whether this call ran `init`.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: K, init: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(&key).await;
        let mut computed = false;
        let value = cell
            .get_or_try_init(|| {
                computed = true;
                init()
            })
            .await?
            .clone();
        Ok((value, computed))
    }
}
