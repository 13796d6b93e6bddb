//! RAII guards
//!
//! [`WorkerReleaseGuard`] makes a unit of work that panics or is cancelled
//! still give its connections back. [`PendingConnection`] closes a freshly
//! created connection that never made it into a worker cache.

use super::cache::WorkerId;
use super::factory::ConnectionFactory;
use super::manager::PoolManager;
use std::sync::Arc;
use tracing::warn;

/// A created connection still being prepared for service
///
/// Closed on drop unless [`accept`](Self::accept)ed, so a timed-out or
/// cancelled acquisition never leaks the backend connection.
pub struct PendingConnection<F: ConnectionFactory> {
    factory: Arc<F>,
    conn: Arc<F::Connection>,
    alias: String,
    armed: bool,
}

impl<F: ConnectionFactory> PendingConnection<F> {
    /// Guard `conn`, created by `factory` for `alias`
    pub fn new(factory: Arc<F>, conn: F::Connection, alias: &str) -> Self {
        PendingConnection {
            factory,
            conn: Arc::new(conn),
            alias: alias.to_string(),
            armed: true,
        }
    }

    /// The connection being prepared
    pub fn connection(&self) -> &F::Connection {
        &self.conn
    }

    /// Hand the connection over to the pool
    pub fn accept(mut self) -> Arc<F::Connection> {
        self.armed = false;
        self.conn.clone()
    }

    /// Close the connection now
    pub async fn discard(mut self) {
        if let Err(e) = self.factory.close(&self.conn).await {
            warn!(alias = %self.alias, "Failed to close connection: {:#}", e);
        }
        self.armed = false;
    }
}

impl<F: ConnectionFactory> Drop for PendingConnection<F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let factory = self.factory.clone();
        let conn = self.conn.clone();
        let alias = std::mem::take(&mut self.alias);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = factory.close(&conn).await {
                        warn!(%alias, "Failed to close abandoned connection: {:#}", e);
                    }
                });
            }
            Err(_) => {
                warn!(%alias, "No runtime available, abandoned connection not closed");
            }
        }
    }
}

/// Releases every connection of a worker when dropped, unless disarmed
///
/// `Drop` cannot await, so the release runs as a spawned task.
pub struct WorkerReleaseGuard<F: ConnectionFactory> {
    /// Pool to release into (None once disarmed)
    pool: Option<Arc<PoolManager<F>>>,
    /// Worker whose connections are released
    worker: WorkerId,
}

impl<F: ConnectionFactory> WorkerReleaseGuard<F> {
    /// Create a new guard
    pub fn new(pool: Arc<PoolManager<F>>, worker: WorkerId) -> Self {
        WorkerReleaseGuard {
            pool: Some(pool),
            worker,
        }
    }

    /// Worker covered by the guard
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Release now and disarm the guard
    pub async fn release(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release_all_for(self.worker).await;
        }
    }

    /// Disarm the guard without releasing anything
    pub fn disarm(mut self) {
        self.pool = None;
    }
}

impl<F: ConnectionFactory> Drop for WorkerReleaseGuard<F> {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else { return };
        let worker = self.worker;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    pool.release_all_for(worker).await;
                });
            }
            Err(_) => {
                warn!(%worker, "No runtime available, worker connections not released");
            }
        }
    }
}
