//! In-process simulated database backend
//!
//! Used by the CLI workload and the test suite. Failures and latency can be
//! injected per operation.

use super::factory::{ConnectionFactory, SessionSettings};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A simulated database session
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    alias: String,
    schema: Mutex<Option<String>>,
    settings: Mutex<Option<SessionSettings>>,
    statements: AtomicU64,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(id: u64, alias: &str) -> Self {
        MemoryConnection {
            id,
            alias: alias.to_string(),
            schema: Mutex::new(None),
            settings: Mutex::new(None),
            statements: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Alias the connection was opened for
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Currently bound schema, `None` for the default schema
    pub fn schema(&self) -> Option<String> {
        self.schema
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Session settings applied to this connection
    pub fn settings(&self) -> Option<SessionSettings> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the connection was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of statements executed
    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    /// Execute a statement against the simulated session
    pub fn execute(&self, _sql: &str) -> Result<()> {
        if self.is_closed() {
            bail!("connection {} is closed", self.id);
        }
        self.statements.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_schema(&self, schema: Option<String>) {
        *self.schema.lock().unwrap_or_else(PoisonError::into_inner) = schema;
    }
}

/// Factory producing [`MemoryConnection`]s
#[derive(Debug, Default)]
pub struct MemoryConnectionFactory {
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    reclaim_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_settings: AtomicBool,
    fail_bind: AtomicBool,
    fail_reset: AtomicBool,
    unusable: AtomicBool,
    create_delay: Mutex<Duration>,
    bind_delay: Mutex<Duration>,
    source_idle: AtomicUsize,
}

impl MemoryConnectionFactory {
    /// Create a factory with no injected faults
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `apply_settings` fail
    pub fn set_fail_settings(&self, fail: bool) {
        self.fail_settings.store(fail, Ordering::SeqCst);
    }

    /// Make `bind_schema` fail
    pub fn set_fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    /// Make `reset_schema` fail
    pub fn set_fail_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Report every connection as unusable
    pub fn set_unusable(&self, unusable: bool) {
        self.unusable.store(unusable, Ordering::SeqCst);
    }

    /// Delay every `create` by `delay`
    pub fn set_create_delay(&self, delay: Duration) {
        *self
            .create_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Delay every `bind_schema` by `delay`
    pub fn set_bind_delay(&self, delay: Duration) {
        *self
            .bind_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Pretend the backend holds `count` idle handles nobody checked out
    pub fn set_source_idle(&self, count: usize) {
        self.source_idle.store(count, Ordering::SeqCst);
    }

    /// Connections opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Times `reclaim_idle` was invoked
    pub fn reclaim_calls(&self) -> usize {
        self.reclaim_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    type Connection = MemoryConnection;

    async fn create(&self, alias: &str) -> Result<MemoryConnection> {
        let delay = *self
            .create_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("connection refused by '{}'", alias);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection::new(id, alias))
    }

    async fn apply_settings(
        &self,
        conn: &MemoryConnection,
        settings: &SessionSettings,
    ) -> Result<()> {
        if self.fail_settings.load(Ordering::SeqCst) {
            bail!("unrecognized configuration parameter");
        }
        *conn.settings.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(())
    }

    async fn bind_schema(&self, conn: &MemoryConnection, schema: &str) -> Result<()> {
        let delay = *self
            .bind_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_bind.load(Ordering::SeqCst) {
            bail!("schema \"{}\" does not exist", schema);
        }
        conn.set_schema(Some(schema.to_string()));
        Ok(())
    }

    async fn reset_schema(&self, conn: &MemoryConnection) -> Result<()> {
        if self.fail_reset.load(Ordering::SeqCst) {
            bail!("cannot reset search path");
        }
        conn.set_schema(None);
        Ok(())
    }

    async fn close(&self, conn: &MemoryConnection) -> Result<()> {
        if !conn.closed.swap(true, Ordering::SeqCst) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_usable(&self, conn: &MemoryConnection) -> bool {
        !conn.is_closed() && !self.unusable.load(Ordering::SeqCst)
    }

    async fn reclaim_idle(&self, _idle_timeout: Duration) -> Result<usize> {
        self.reclaim_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.source_idle.swap(0, Ordering::SeqCst))
    }
}
