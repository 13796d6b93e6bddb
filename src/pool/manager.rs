//! Pool manager
//!
//! Owns the configuration, statistics and worker caches of one pool and
//! implements acquisition with admission control, recycling and reclaiming.
//! Locks guard only in-memory state; no lock is held across connection I/O.

use super::cache::{WorkerCaches, WorkerId};
use super::factory::{ConnectionFactory, SessionSettings};
use super::guard::PendingConnection;
use super::record::{ConnectionHandle, ConnectionRecord};
use super::scheduler::CleanupScheduler;
use super::sink::{AlertKind, AlertPayload, MetricsSink, TracingSink};
use super::stats::{StatsRegistry, StatsSnapshot};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::tenant::TenantContext;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Why a cached connection is not handed out again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eviction {
    /// The factory reports the connection dead
    Unusable,
    /// The caller needs a different tenant schema
    SchemaChanged,
    /// The connection was admitted for another tenant
    TenantChanged,
    /// Usage count or age exceeded
    Recycle,
}

enum Cached<C> {
    Hit(ConnectionHandle<C>),
    Evict(Eviction),
}

/// Rolls back an admission unless disarmed
///
/// Dropping an in-flight acquire (cancellation) or returning early on any
/// failure branch leaves the counters balanced.
struct AdmissionGuard<'a> {
    stats: &'a StatsRegistry,
    tenant: Option<&'a str>,
    armed: bool,
}

impl<'a> AdmissionGuard<'a> {
    fn new(stats: &'a StatsRegistry, tenant: Option<&'a str>) -> Self {
        AdmissionGuard {
            stats,
            tenant,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.stats.rollback_admission(self.tenant);
        }
    }
}

/// Tenant-aware connection pool
pub struct PoolManager<F: ConnectionFactory> {
    /// Configuration
    config: PoolConfig,
    /// Session settings derived from the configuration
    settings: SessionSettings,
    /// Source of raw connections
    factory: Arc<F>,
    /// Statistics
    stats: Arc<StatsRegistry>,
    /// Per-worker connection caches
    caches: WorkerCaches<F::Connection>,
    /// Sweep cadence and shutdown signal
    scheduler: CleanupScheduler,
    /// Alert receiver
    sink: Arc<dyn MetricsSink>,
}

impl<F: ConnectionFactory> PoolManager<F> {
    /// Create a pool manager that logs alerts through `tracing`
    pub fn new(config: PoolConfig, factory: Arc<F>) -> Result<Self> {
        Self::with_sink(config, factory, Arc::new(TracingSink))
    }

    /// Create a pool manager delivering alerts to `sink`
    pub fn with_sink(
        config: PoolConfig,
        factory: Arc<F>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate().map_err(PoolError::Config)?;

        Ok(PoolManager {
            settings: SessionSettings::from_pool_config(&config),
            scheduler: CleanupScheduler::new(config.monitor_interval()),
            config,
            factory,
            stats: Arc::new(StatsRegistry::new()),
            caches: WorkerCaches::new(),
            sink,
        })
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Connection factory
    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// Shared statistics registry
    pub fn stats_registry(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Acquire a connection to `alias` for the current worker
    pub async fn acquire(
        &self,
        alias: &str,
        tenant: Option<&TenantContext>,
    ) -> Result<ConnectionHandle<F::Connection>> {
        self.acquire_for(WorkerId::current(), alias, tenant).await
    }

    /// Acquire a connection to `alias` for `worker`
    ///
    /// Returns the worker's cached connection when it is still usable,
    /// admitted for the same tenant, bound to the requested schema and within
    /// its usage and age budget.
    /// Otherwise admits a new connection against the ceiling, creates it,
    /// applies session settings and binds the tenant schema. Admission never
    /// waits for capacity: it fails with [`PoolError::PoolExhausted`].
    pub async fn acquire_for(
        &self,
        worker: WorkerId,
        alias: &str,
        tenant: Option<&TenantContext>,
    ) -> Result<ConnectionHandle<F::Connection>> {
        if alias.is_empty() {
            return Err(PoolError::InvalidAlias);
        }

        let started = Instant::now();
        let tenant_id = tenant.map(|t| t.tenant_id.as_str());
        let schema = tenant.and_then(|t| t.schema.as_deref());

        match self.lookup_cached(worker, alias, tenant_id, schema) {
            Some(Cached::Hit(handle)) => {
                self.stats.record_reuse();
                self.stats.record_wait(started.elapsed());
                trace!(
                    %worker,
                    alias,
                    usage = handle.usage_count(),
                    "Reusing cached connection"
                );
                return Ok(handle);
            }
            Some(Cached::Evict(reason)) => {
                if reason == Eviction::Recycle {
                    self.stats.record_reuse();
                    self.stats.record_recycled(1);
                }
                debug!(%worker, alias, ?reason, "Evicting cached connection");
                self.release_for(worker, alias).await;
            }
            None => {}
        }

        self.sweep_once().await;

        let admission = self.stats.admit(tenant_id);
        let guard = AdmissionGuard::new(&self.stats, tenant_id);

        let mut granted = admission.active;
        if admission.active > self.config.max_connections {
            let reclaimed = self.reclaim_idle_connections().await;
            granted = self.stats.active_connections();
            if granted > self.config.max_connections {
                drop(guard);
                let active = self.stats.active_connections();
                self.stats.record_error();
                warn!(
                    %worker,
                    alias,
                    active,
                    max = self.config.max_connections,
                    reclaimed,
                    "Admission rejected, pool exhausted"
                );
                return Err(PoolError::PoolExhausted {
                    alias: alias.to_string(),
                    active,
                    max: self.config.max_connections,
                });
            }
        }

        let conn = match self.establish(alias, schema).await {
            Ok(conn) => conn,
            Err(e @ PoolError::ConnectionTimeout { .. }) => {
                self.stats.record_timeout();
                warn!(%worker, alias, error = %e, "Connection creation timed out");
                return Err(e);
            }
            Err(e) => {
                self.stats.record_error();
                warn!(%worker, alias, error = %e, "Connection acquisition failed");
                return Err(e);
            }
        };

        let record = ConnectionRecord::new(
            alias,
            conn,
            worker,
            tenant_id.map(str::to_string),
            schema.map(str::to_string),
        );
        let handle = record.handle();

        let mut guard = guard;
        guard.disarm();
        if let Some(peak) = self.stats.record_peak(granted) {
            self.check_peak(peak, alias, tenant_id);
        }
        if let Some(displaced) = self.caches.insert(record) {
            self.retire(displaced).await;
        }
        self.stats.record_opened(started.elapsed());

        debug!(
            %worker,
            alias,
            tenant = tenant_id.unwrap_or("-"),
            active = self.stats.active_connections(),
            "Created new connection"
        );
        Ok(handle)
    }

    /// Release the current worker's connection to `alias`
    pub async fn release(&self, alias: &str) {
        self.release_for(WorkerId::current(), alias).await;
    }

    /// Release `worker`'s connection to `alias`; a no-op if none is cached
    pub async fn release_for(&self, worker: WorkerId, alias: &str) {
        match self.caches.remove(worker, alias) {
            Some(record) => self.retire(record).await,
            None => trace!(%worker, alias, "Nothing cached to release"),
        }
    }

    /// Release every connection of the current worker
    pub async fn release_all(&self) {
        self.release_all_for(WorkerId::current()).await;
    }

    /// Release every connection cached by `worker`
    pub async fn release_all_for(&self, worker: WorkerId) {
        let records = self.caches.drain_worker(worker);
        if records.is_empty() {
            return;
        }
        debug!(%worker, count = records.len(), "Releasing all worker connections");
        self.retire_all(records).await;
    }

    /// Whether `record` exceeded its usage budget or lifetime
    pub fn should_recycle(&self, record: &ConnectionRecord<F::Connection>) -> bool {
        record.should_recycle(&self.config)
    }

    /// Recycle aged or over-used connections in every worker, if a sweep is due
    ///
    /// Returns the number of connections recycled.
    pub async fn sweep_once(&self) -> usize {
        match self.scheduler.try_begin() {
            Some(_permit) => self.sweep_recycled().await,
            None => 0,
        }
    }

    /// Run a recycle sweep now, ignoring the cadence
    pub async fn force_sweep(&self) -> usize {
        match self.scheduler.begin() {
            Some(_permit) => self.sweep_recycled().await,
            None => 0,
        }
    }

    async fn sweep_recycled(&self) -> usize {
        let records = self
            .caches
            .remove_where(|record| record.should_recycle(&self.config));
        let count = records.len();
        if count > 0 {
            self.stats.record_recycled(count);
            self.retire_all(records).await;
        }
        debug!(recycled = count, "Cleanup sweep finished");
        count
    }

    /// Ask the factory to close source-level handles idle past `idle_timeout`
    ///
    /// Connections cached by workers are never touched: a worker owns its
    /// connections until it releases them. Best-effort and bounded by the
    /// connection timeout. Returns the number of handles the factory closed.
    pub async fn reclaim_idle_connections(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let reclaim = self.factory.reclaim_idle(idle_timeout);

        match tokio::time::timeout(self.config.connection_timeout(), reclaim).await {
            Ok(Ok(count)) => {
                self.stats.record_reclaimed(count);
                debug!(reclaimed = count, "Reclaimed idle source connections");
                count
            }
            Ok(Err(e)) => {
                warn!("Failed to reclaim idle source connections: {:#}", e);
                0
            }
            Err(_) => {
                warn!("Reclaiming idle connections timed out");
                0
            }
        }
    }

    /// Get a point-in-time copy of the statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero cumulative statistics, keeping current connection counts
    pub fn reset_stats(&self) {
        self.stats.reset();
        info!("Pool statistics reset");
    }

    /// Total number of cached connections across workers
    pub fn cached_connections(&self) -> usize {
        self.caches.len()
    }

    /// Number of connections cached by `worker`
    pub fn worker_connections(&self, worker: WorkerId) -> usize {
        self.caches.worker_len(worker)
    }

    /// Whether `worker` holds a connection to `alias`
    pub fn is_cached(&self, worker: WorkerId, alias: &str) -> bool {
        self.caches.contains(worker, alias)
    }

    /// Start the periodic cleanup loop
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.run_monitor().await;
        })
    }

    async fn run_monitor(&self) {
        let interval = self.scheduler.interval();
        info!(?interval, "Pool monitor started");

        loop {
            tokio::select! {
                _ = self.scheduler.wait_shutdown() => {
                    info!("Pool monitor shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    self.sweep_once().await;
                    self.log_health();
                }
            }
        }
    }

    /// Log pool health status
    pub fn log_health(&self) {
        let stats = self.stats.snapshot();
        debug!(
            "Pool health: active={}, peak={}, requests={}, errors={}, timeouts={}, reused={}, recycled={}, reclaimed={}, avg_wait={:?}, avg_lifetime={:?}",
            stats.active_connections,
            stats.peak_connections,
            stats.total_requests,
            stats.connection_errors,
            stats.connection_timeouts,
            stats.reuse_count,
            stats.recycled_count,
            stats.reclaimed_count,
            stats.average_wait_time,
            stats.average_connection_lifetime
        );
        let idle_timeout = self.config.idle_timeout();
        let idle_held = self.caches.count_where(|record| record.is_idle(idle_timeout));
        if idle_held > 0 {
            debug!(
                idle_held,
                ?idle_timeout,
                "Connections held past the idle timeout"
            );
        }
        if stats.active_connections < self.config.min_connections {
            debug!(
                active = stats.active_connections,
                min = self.config.min_connections,
                "Active connections below configured minimum"
            );
        }
    }

    /// Stop the monitor and release every cached connection
    pub async fn close(&self) {
        self.scheduler.shutdown();
        let records = self.caches.drain_all();
        let count = records.len();
        self.retire_all(records).await;
        info!(released = count, "Pool closed");
    }

    /// Check if the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.scheduler.is_shutdown()
    }

    fn lookup_cached(
        &self,
        worker: WorkerId,
        alias: &str,
        tenant_id: Option<&str>,
        schema: Option<&str>,
    ) -> Option<Cached<F::Connection>> {
        self.caches.with_record(worker, alias, |record| {
            if !self.factory.is_usable(record.connection()) {
                return Cached::Evict(Eviction::Unusable);
            }
            if record.tenant_id() != tenant_id {
                return Cached::Evict(Eviction::TenantChanged);
            }
            if record.schema() != schema {
                return Cached::Evict(Eviction::SchemaChanged);
            }
            record.mark_used();
            if record.should_recycle(&self.config) {
                return Cached::Evict(Eviction::Recycle);
            }
            Cached::Hit(record.handle())
        })
    }

    /// Create and prepare a connection within the connection timeout
    async fn establish(&self, alias: &str, schema: Option<&str>) -> Result<Arc<F::Connection>> {
        let timeout = self.config.connection_timeout();
        let deadline = Instant::now() + timeout;
        let timed_out = || PoolError::ConnectionTimeout {
            alias: alias.to_string(),
            timeout,
        };

        let conn = match tokio::time::timeout_at(deadline, self.factory.create(alias)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(PoolError::ConnectionCreateFailed {
                    alias: alias.to_string(),
                    reason: format!("{:#}", e),
                })
            }
            Err(_) => return Err(timed_out()),
        };

        let pending = PendingConnection::new(self.factory.clone(), conn, alias);
        let prepared =
            tokio::time::timeout_at(deadline, self.prepare(pending.connection(), alias, schema))
                .await;

        match prepared {
            Ok(Ok(())) => Ok(pending.accept()),
            Ok(Err(e)) => {
                pending.discard().await;
                Err(e)
            }
            Err(_) => {
                pending.discard().await;
                Err(timed_out())
            }
        }
    }

    /// Apply session settings and bind the tenant schema
    async fn prepare(&self, conn: &F::Connection, alias: &str, schema: Option<&str>) -> Result<()> {
        if !self.factory.is_usable(conn) {
            return Err(PoolError::ConnectionCreateFailed {
                alias: alias.to_string(),
                reason: "connection is not usable".to_string(),
            });
        }

        if let Err(e) = self.factory.apply_settings(conn, &self.settings).await {
            warn!(alias, "Failed to apply session settings: {:#}", e);
        }

        if let Some(schema) = schema {
            if let Err(e) = self.factory.bind_schema(conn, schema).await {
                return Err(PoolError::SchemaBindFailed {
                    alias: alias.to_string(),
                    schema: schema.to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }

        Ok(())
    }

    fn check_peak(&self, peak: usize, alias: &str, tenant_id: Option<&str>) {
        let threshold = self.config.critical_connection_threshold;
        if peak >= threshold {
            self.sink.on_alert(
                AlertKind::CriticalPeak,
                &AlertPayload {
                    peak_connections: peak,
                    threshold,
                    alias: alias.to_string(),
                    tenant_id: tenant_id.map(str::to_string),
                },
            );
        }
    }

    fn account_release(&self, record: &ConnectionRecord<F::Connection>) {
        self.stats.record_release(record.tenant_id(), record.age());
    }

    async fn retire(&self, record: ConnectionRecord<F::Connection>) {
        self.account_release(&record);
        self.close_record(record).await;
    }

    async fn retire_all(&self, records: Vec<ConnectionRecord<F::Connection>>) {
        for record in &records {
            self.account_release(record);
        }
        for record in records {
            self.close_record(record).await;
        }
    }

    async fn close_record(&self, record: ConnectionRecord<F::Connection>) {
        if record.schema().is_some() {
            if let Err(e) = self.factory.reset_schema(record.connection()).await {
                warn!(alias = record.alias(), "Failed to reset session schema: {:#}", e);
            }
        }
        self.close_quietly(record.connection(), record.alias()).await;
        debug!(
            worker = %record.worker(),
            alias = record.alias(),
            usage = record.usage_count(),
            age = ?record.age(),
            "Released connection"
        );
    }

    async fn close_quietly(&self, conn: &F::Connection, alias: &str) {
        if let Err(e) = self.factory.close(conn).await {
            warn!(alias, "Failed to close connection: {:#}", e);
        }
    }
}
