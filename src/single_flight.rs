use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;

// Collapses concurrent executions for the same key into one future; every
// caller observes that execution's result. Process-local: cross-process
// exactly-once comes from database conditional writes, not from here.
pub struct SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    inflight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // The leader clears the registry entry after completion, success or
    // error, so a failed attempt never blocks a later retry.
    pub async fn run<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        let (future, leader) = {
            let mut inflight = self.inflight.lock().expect("single-flight registry poisoned");
            if let Some(existing) = inflight.get(&key) {
                (existing.clone(), false)
            } else {
                let shared = make().shared();
                inflight.insert(key.clone(), shared.clone());
                (shared, true)
            }
        };

        let result = future.await;

        if leader {
            let mut inflight = self.inflight.lock().expect("single-flight registry poisoned");
            inflight.remove(&key);
        }

        result
    }

    #[cfg(test)]
    pub fn inflight_count(&self) -> usize {
        self.inflight
            .lock()
            .expect("single-flight registry poisoned")
            .len()
    }
}
