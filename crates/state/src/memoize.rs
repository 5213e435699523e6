//! Process-wide memoization of expensive async setup.

use crate::error::StateResult;
use dashmap::DashMap;
use scopestate_core::Fingerprint;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Caches one value per fingerprint and collapses concurrent initializations.
///
/// The per-key cell is published before initialization starts, so every
/// caller that arrives while the first one is still working awaits the same
/// future instead of starting a second one. A failed initialization drops the
/// empty cell and the next caller retries.
pub struct Memoizer<V> {
    cells: DashMap<Fingerprint, Arc<OnceCell<V>>>,
}

impl<V> Default for Memoizer<V> {
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }
}

impl<V: Clone + Send + Sync> Memoizer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, running `init` if there is none.
    pub async fn get_or_try_init<F, Fut>(&self, key: Fingerprint, init: F) -> StateResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StateResult<V>>,
    {
        // Clone the cell out so the map shard lock is not held across the await.
        let cell = self.cells.entry(key.clone()).or_default().clone();
        match cell.get_or_try_init(init).await {
            Ok(value) => Ok(value.clone()),
            Err(err) => {
                self.cells.remove_if(&key, |_, cell| !cell.initialized());
                Err(err)
            }
        }
    }

    /// Number of keys with a cell, cached or still initializing.
    pub fn tracked(&self) -> usize {
        self.cells.len()
    }

    /// Whether a value is cached for `key`.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.cells
            .get(key)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
