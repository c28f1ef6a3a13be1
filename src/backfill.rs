// Background backfill bookkeeping: one task per key at a time, joinable on demand.

use dashmap::DashMap;
use log::{debug, warn};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::{JoinError, JoinSet};

use crate::metrics;

/// Clears the in-flight mark when the task ends, panics included.
struct InFlightGuard<K: Eq + Hash> {
    in_flight: Arc<DashMap<K, ()>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

pub struct Backfills<K> {
    in_flight: Arc<DashMap<K, ()>>,
    tasks: Mutex<JoinSet<()>>,
}

impl<K> Default for Backfills<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Backfills<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        // a panicking task never holds this lock; recover the set as-is
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns `task` unless one is already running for `key`.
    /// Returns whether a task was spawned.
    pub fn spawn<F>(&self, key: K, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.in_flight.insert(key.clone(), ()).is_some() {
            debug!("Backfill {:?} already running", key);
            return false;
        }
        metrics::increment_backfill_spawned();
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            key,
        };
        let mut tasks = self.tasks();
        reap_finished(&mut tasks);
        tasks.spawn(async move {
            let _guard = guard;
            task.await;
        });
        true
    }

    /// Handles of spawned tasks not yet joined.
    pub fn tracked(&self) -> usize {
        self.tasks().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Waits for every task spawned so far.
    pub async fn wait(&self) {
        let mut set = std::mem::take(&mut *self.tasks());
        while let Some(result) = set.join_next().await {
            log_failure(result);
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_failure(result);
    }
}

fn log_failure(result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!("⚠️ Backfill task failed: {}", e);
    }
}
