//! Request adapter
//!
//! Wraps one unit of work: resolves the tenant, acquires a connection for
//! it, runs the work and releases everything the worker holds afterwards,
//! whether the work succeeded, failed or was cancelled.

use crate::error::PoolError;
use crate::helper::RetryConfig;
use crate::pool::{
    ConnectionFactory, ConnectionHandle, PoolManager, WorkerId, WorkerReleaseGuard,
};
use crate::tenant::{TenantContext, TenantContextProvider, DEFAULT_ALIAS};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RequestTimings {
    requests: u64,
    failed: u64,
    total: Duration,
    slowest: Duration,
}

/// Request timing, independent of pool statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestTimingSnapshot {
    /// Requests handled
    pub requests: u64,
    /// Requests whose work or acquisition failed
    pub failed: u64,
    /// Sum of request durations
    pub total: Duration,
    /// Slowest request seen
    pub slowest: Duration,
}

impl RequestTimingSnapshot {
    /// Mean request duration
    pub fn average(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        self.total / self.requests as u32
    }
}

/// Runs units of work against a shared pool
pub struct RequestAdapter<F: ConnectionFactory, P: TenantContextProvider> {
    pool: Arc<PoolManager<F>>,
    provider: P,
    default_alias: String,
    retry: Option<RetryConfig>,
    timings: Mutex<RequestTimings>,
}

impl<F: ConnectionFactory, P: TenantContextProvider> RequestAdapter<F, P> {
    /// Create an adapter; work without a tenant context targets `default_alias`
    pub fn new(pool: Arc<PoolManager<F>>, provider: P, default_alias: impl Into<String>) -> Self {
        RequestAdapter {
            pool,
            provider,
            default_alias: default_alias.into(),
            retry: None,
            timings: Mutex::new(RequestTimings::default()),
        }
    }

    /// Retry transient acquisition failures with `retry`
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Underlying pool
    pub fn pool(&self) -> &Arc<PoolManager<F>> {
        &self.pool
    }

    /// Handle one unit of work
    ///
    /// The work runs inside a fresh worker scope, so further `acquire` calls
    /// it makes land in that scope's cache and are released with it.
    /// Connections of an enclosing worker scope are left untouched.
    pub async fn handle<T, W, Fut>(&self, work: W) -> anyhow::Result<T>
    where
        W: FnOnce(ConnectionHandle<F::Connection>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let context = self.provider.current();
        let alias = context
            .as_ref()
            .map(|c| c.alias.clone())
            .unwrap_or_else(|| self.default_alias.clone());
        let worker = WorkerId::next();
        let started = Instant::now();

        let guard = WorkerReleaseGuard::new(self.pool.clone(), worker);
        let result = worker
            .scope(async {
                let conn = self
                    .acquire_with_retry(worker, &alias, context.as_ref())
                    .await?;
                work(conn).await
            })
            .await;
        guard.release().await;

        let elapsed = started.elapsed();
        if let Err(e) = &result {
            warn!(%worker, %alias, error = %e, "Request failed");
        } else {
            debug!(%worker, %alias, ?elapsed, "Request completed");
        }
        self.record(elapsed, result.is_err());

        result
    }

    async fn acquire_with_retry(
        &self,
        worker: WorkerId,
        alias: &str,
        context: Option<&TenantContext>,
    ) -> Result<ConnectionHandle<F::Connection>, PoolError> {
        let mut attempt = 0;
        loop {
            match self.pool.acquire_for(worker, alias, context).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_retryable() => match &self.retry {
                    Some(retry) if retry.allows_retry(attempt) => {
                        let delay = retry.delay_for_attempt(attempt);
                        debug!(%worker, alias, attempt, ?delay, error = %e, "Retrying acquire");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    _ => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn record(&self, elapsed: Duration, failed: bool) {
        let mut timings = self.timings.lock().unwrap_or_else(PoisonError::into_inner);
        timings.requests += 1;
        if failed {
            timings.failed += 1;
        }
        timings.total += elapsed;
        timings.slowest = timings.slowest.max(elapsed);
    }

    /// Request timing so far
    pub fn timings(&self) -> RequestTimingSnapshot {
        let timings = self.timings.lock().unwrap_or_else(PoisonError::into_inner);
        RequestTimingSnapshot {
            requests: timings.requests,
            failed: timings.failed,
            total: timings.total,
            slowest: timings.slowest,
        }
    }
}

impl<F: ConnectionFactory, P: TenantContextProvider + Default> RequestAdapter<F, P> {
    /// Adapter with a default provider targeting [`DEFAULT_ALIAS`]
    pub fn with_default_provider(pool: Arc<PoolManager<F>>) -> Self {
        Self::new(pool, P::default(), DEFAULT_ALIAS)
    }
}
