//! Per-worker connection caches
//!
//! Every worker keeps at most one live connection per database alias. A
//! worker is a task scope set up with [`WorkerId::scope`], or the current OS
//! thread when no scope is active.

use super::record::ConnectionRecord;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

tokio::task_local! {
    static TASK_WORKER: WorkerId;
}

/// Identifier of a unit of execution owning a connection cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Allocate a fresh, process-unique worker id
    pub fn next() -> Self {
        WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Worker id of the enclosing task scope, if any
    pub fn task_scoped() -> Option<Self> {
        TASK_WORKER.try_with(|id| *id).ok()
    }

    /// Worker id of the caller: the task scope if one is active, else the thread
    pub fn current() -> Self {
        Self::task_scoped().unwrap_or_else(|| {
            THREAD_WORKER.with(|cell| match cell.get() {
                Some(id) => id,
                None => {
                    let id = WorkerId::next();
                    cell.set(Some(id));
                    id
                }
            })
        })
    }

    /// Run `fut` with this id as the current worker
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        TASK_WORKER.scope(self, fut).await
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// All worker caches of one pool
///
/// The lock only guards in-memory map mutation; callers close connections
/// after the records have been taken out.
pub struct WorkerCaches<C> {
    workers: Mutex<HashMap<WorkerId, HashMap<String, ConnectionRecord<C>>>>,
}

impl<C> Default for WorkerCaches<C> {
    fn default() -> Self {
        WorkerCaches {
            workers: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> WorkerCaches<C> {
    /// Create an empty set of caches
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkerId, HashMap<String, ConnectionRecord<C>>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the worker's record for `alias`, if cached
    pub fn with_record<R>(
        &self,
        worker: WorkerId,
        alias: &str,
        f: impl FnOnce(&mut ConnectionRecord<C>) -> R,
    ) -> Option<R> {
        let mut workers = self.lock();
        workers
            .get_mut(&worker)
            .and_then(|cache| cache.get_mut(alias))
            .map(f)
    }

    /// Insert a record, returning the one it displaced
    pub fn insert(&self, record: ConnectionRecord<C>) -> Option<ConnectionRecord<C>> {
        let mut workers = self.lock();
        workers
            .entry(record.worker)
            .or_default()
            .insert(record.alias.clone(), record)
    }

    /// Remove the worker's record for `alias`
    pub fn remove(&self, worker: WorkerId, alias: &str) -> Option<ConnectionRecord<C>> {
        let mut workers = self.lock();
        let cache = workers.get_mut(&worker)?;
        let record = cache.remove(alias);
        if cache.is_empty() {
            workers.remove(&worker);
        }
        record
    }

    /// Take every record owned by `worker`
    pub fn drain_worker(&self, worker: WorkerId) -> Vec<ConnectionRecord<C>> {
        self.lock()
            .remove(&worker)
            .map(|cache| cache.into_values().collect())
            .unwrap_or_default()
    }

    /// Take every record of every worker
    pub fn drain_all(&self) -> Vec<ConnectionRecord<C>> {
        self.lock()
            .drain()
            .flat_map(|(_, cache)| cache.into_values())
            .collect()
    }

    /// Take every record matching `pred`, across all workers
    pub fn remove_where(
        &self,
        mut pred: impl FnMut(&ConnectionRecord<C>) -> bool,
    ) -> Vec<ConnectionRecord<C>> {
        let mut workers = self.lock();
        let mut taken = Vec::new();

        for cache in workers.values_mut() {
            let aliases: Vec<String> = cache
                .iter()
                .filter(|(_, record)| pred(record))
                .map(|(alias, _)| alias.clone())
                .collect();
            for alias in aliases {
                if let Some(record) = cache.remove(&alias) {
                    taken.push(record);
                }
            }
        }
        workers.retain(|_, cache| !cache.is_empty());

        taken
    }

    /// Number of records matching `pred`, across all workers
    pub fn count_where(&self, mut pred: impl FnMut(&ConnectionRecord<C>) -> bool) -> usize {
        self.lock()
            .values()
            .flat_map(HashMap::values)
            .filter(|record| pred(record))
            .count()
    }

    /// Whether `worker` has a cached record for `alias`
    pub fn contains(&self, worker: WorkerId, alias: &str) -> bool {
        self.lock()
            .get(&worker)
            .is_some_and(|cache| cache.contains_key(alias))
    }

    /// Number of records cached by `worker`
    pub fn worker_len(&self, worker: WorkerId) -> usize {
        self.lock().get(&worker).map_or(0, HashMap::len)
    }

    /// Total number of cached records
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    /// Whether no records are cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of workers holding at least one record
    pub fn worker_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worker: WorkerId, alias: &str) -> ConnectionRecord<&'static str> {
        ConnectionRecord::new(alias, "conn", worker, None, None)
    }

    #[test]
    fn test_worker_id_unique() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(format!("{}", a), format!("worker-{}", a.as_u64()));
    }

    #[test]
    fn test_worker_id_current_is_stable_per_thread() {
        assert_eq!(WorkerId::current(), WorkerId::current());

        let here = WorkerId::current();
        let other = std::thread::spawn(WorkerId::current).join().unwrap();
        assert_ne!(here, other);
    }

    #[tokio::test]
    async fn test_worker_id_scope() {
        let id = WorkerId::next();
        assert!(WorkerId::task_scoped().is_none());

        let seen = id.scope(async { WorkerId::current() }).await;
        assert_eq!(seen, id);
        assert!(WorkerId::task_scoped().is_none());
    }

    #[test]
    fn test_cache_one_record_per_alias() {
        let caches = WorkerCaches::new();
        let worker = WorkerId::next();

        assert!(caches.insert(record(worker, "db")).is_none());
        assert!(caches.insert(record(worker, "db")).is_some());
        assert_eq!(caches.worker_len(worker), 1);
        assert!(caches.contains(worker, "db"));
    }

    #[test]
    fn test_cache_workers_are_isolated() {
        let caches = WorkerCaches::new();
        let a = WorkerId::next();
        let b = WorkerId::next();

        caches.insert(record(a, "db"));
        caches.insert(record(b, "db"));
        assert_eq!(caches.len(), 2);
        assert_eq!(caches.worker_count(), 2);

        assert!(caches.remove(a, "db").is_some());
        assert!(!caches.contains(a, "db"));
        assert!(caches.contains(b, "db"));
        assert_eq!(caches.worker_count(), 1);
    }

    #[test]
    fn test_cache_remove_missing() {
        let caches: WorkerCaches<&str> = WorkerCaches::new();
        assert!(caches.remove(WorkerId::next(), "db").is_none());
        assert!(caches.is_empty());
    }

    #[test]
    fn test_cache_with_record() {
        let caches = WorkerCaches::new();
        let worker = WorkerId::next();
        caches.insert(record(worker, "db"));

        let count = caches.with_record(worker, "db", |r| {
            r.mark_used();
            r.usage_count()
        });
        assert_eq!(count, Some(2));
        assert!(caches.with_record(worker, "other", |r| r.usage_count()).is_none());
    }

    #[test]
    fn test_cache_drain_worker() {
        let caches = WorkerCaches::new();
        let a = WorkerId::next();
        let b = WorkerId::next();
        caches.insert(record(a, "db"));
        caches.insert(record(a, "db2"));
        caches.insert(record(b, "db"));

        let drained = caches.drain_worker(a);
        assert_eq!(drained.len(), 2);
        assert_eq!(caches.len(), 1);
        assert!(caches.drain_worker(a).is_empty());

        assert_eq!(caches.drain_all().len(), 1);
        assert!(caches.is_empty());
    }

    #[test]
    fn test_cache_remove_where_spans_workers() {
        let caches = WorkerCaches::new();
        let a = WorkerId::next();
        let b = WorkerId::next();
        caches.insert(record(a, "db"));
        caches.insert(record(b, "db"));
        caches.insert(record(b, "db2"));

        assert_eq!(caches.count_where(|r| r.alias() == "db"), 2);
        let taken = caches.remove_where(|r| r.alias() == "db");
        assert_eq!(taken.len(), 2);
        assert!(!caches.contains(a, "db"));
        assert!(caches.contains(b, "db2"));
        assert_eq!(caches.worker_count(), 1);

        let taken = caches.remove_where(|_| true);
        assert_eq!(taken.len(), 1);
        assert_eq!(caches.worker_count(), 0);
        assert_eq!(caches.count_where(|_| true), 0);
    }
}
