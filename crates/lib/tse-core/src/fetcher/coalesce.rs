use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Keyed registry of in-flight operations.
///
/// Concurrent callers for the same key share one underlying future. The map
/// lock only guards the start-or-join decision and waiter bookkeeping; the
/// operation itself runs outside it. Results are never retained once the
/// operation completes.
pub struct InflightRegistry<K, T, E> {
    inner: Arc<Mutex<InflightMap<K, T, E>>>,
}

impl<K, T, E> Clone for InflightRegistry<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct InflightMap<K, T, E> {
    entries: HashMap<K, InflightEntry<T, E>>,
    next_generation: u64,
}

struct InflightEntry<T, E> {
    generation: u64,
    waiters: usize,
    future: SharedFetch<T, E>,
}

impl<K, T, E> Default for InflightRegistry<K, T, E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InflightMap {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }
}

impl<K, T, E> InflightRegistry<K, T, E>
where
    K: Clone + Eq + Hash + Debug,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `start` for `key`, or joins the operation already in flight.
    ///
    /// Dropping the returned future before completion only detaches this
    /// waiter; the shared operation keeps running for the others and is
    /// abandoned once the last waiter leaves.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (future, mut guard) = self.join_or_start(key, start);
        let result = future.await;
        guard.completed = true;
        result
    }

    /// Number of keys with an operation in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().entries.len()
    }

    /// Number of callers waiting on `key`.
    #[must_use]
    pub fn waiters(&self, key: &K) -> usize {
        self.lock().entries.get(key).map_or(0, |entry| entry.waiters)
    }

    fn join_or_start<F, Fut>(&self, key: K, start: F) -> (SharedFetch<T, E>, WaiterGuard<K, T, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut map = self.lock();
        if let Some(entry) = map.entries.get_mut(&key) {
            entry.waiters += 1;
            debug!(?key, waiters = entry.waiters, "joining in-flight fetch");
            let guard = WaiterGuard::new(self.inner.clone(), key, entry.generation);
            return (entry.future.clone(), guard);
        }

        let generation = map.next_generation;
        map.next_generation = map.next_generation.wrapping_add(1);
        let future = start().boxed().shared();
        map.entries.insert(
            key.clone(),
            InflightEntry {
                generation,
                waiters: 1,
                future: future.clone(),
            },
        );
        (future, WaiterGuard::new(self.inner.clone(), key, generation))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InflightMap<K, T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases one waiter's claim on an in-flight entry when dropped.
struct WaiterGuard<K: Eq + Hash, T, E> {
    registry: Arc<Mutex<InflightMap<K, T, E>>>,
    key: K,
    generation: u64,
    completed: bool,
}

impl<K: Eq + Hash, T, E> WaiterGuard<K, T, E> {
    const fn new(registry: Arc<Mutex<InflightMap<K, T, E>>>, key: K, generation: u64) -> Self {
        Self {
            registry,
            key,
            generation,
            completed: false,
        }
    }
}

impl<K: Eq + Hash, T, E> Drop for WaiterGuard<K, T, E> {
    fn drop(&mut self) {
        let mut map = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = map.entries.get_mut(&self.key) else {
            return;
        };
        if entry.generation != self.generation {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if self.completed || entry.waiters == 0 {
            map.entries.remove(&self.key);
        }
    }
}
