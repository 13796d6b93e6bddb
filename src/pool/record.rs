//! Connection record and handle
//!
//! A record is the per-connection bookkeeping kept in a worker cache; the
//! handle is what callers receive from `acquire`.

use super::cache::WorkerId;
use crate::config::PoolConfig;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A live connection owned by exactly one worker
#[derive(Debug)]
pub struct ConnectionRecord<C> {
    /// Database alias this connection targets
    pub(crate) alias: String,
    /// The raw connection
    pub(crate) conn: Arc<C>,
    /// When the connection was created
    pub(crate) created_at: Instant,
    /// When the connection was last handed out
    pub(crate) last_used: Instant,
    /// Number of acquisitions served
    pub(crate) usage_count: u64,
    /// Tenant the connection was admitted for
    pub(crate) tenant_id: Option<String>,
    /// Schema bound on the connection, if any
    pub(crate) schema: Option<String>,
    /// Owning worker
    pub(crate) worker: WorkerId,
}

impl<C> ConnectionRecord<C> {
    /// Create a record for a freshly established connection
    pub fn new(
        alias: impl Into<String>,
        conn: impl Into<Arc<C>>,
        worker: WorkerId,
        tenant_id: Option<String>,
        schema: Option<String>,
    ) -> Self {
        let now = Instant::now();
        ConnectionRecord {
            alias: alias.into(),
            conn: conn.into(),
            created_at: now,
            last_used: now,
            usage_count: 1,
            tenant_id,
            schema,
            worker,
        }
    }

    /// Database alias
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Owning worker
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Tenant the connection was admitted for
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Schema bound on the connection
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Number of acquisitions served so far
    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// Get the age of the connection
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the time since last use
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Check if the connection has been idle longer than `idle_timeout`
    pub fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.idle_time() > idle_timeout
    }

    /// Count one more acquisition served by this connection
    pub fn mark_used(&mut self) {
        self.usage_count += 1;
        self.last_used = Instant::now();
    }

    /// Whether the connection exceeded its usage budget or lifetime
    ///
    /// Pure predicate; consulted on cache hits and by the cleanup sweep.
    pub fn should_recycle(&self, config: &PoolConfig) -> bool {
        self.usage_count > config.max_usage_count || self.age() > config.connection_lifetime()
    }

    /// The raw connection
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// Build a handle sharing this record's connection
    pub fn handle(&self) -> ConnectionHandle<C> {
        ConnectionHandle {
            conn: self.conn.clone(),
            alias: self.alias.clone(),
            tenant_id: self.tenant_id.clone(),
            schema: self.schema.clone(),
            usage_count: self.usage_count,
            worker: self.worker,
        }
    }
}

/// Connection handed to a unit of work
///
/// The handle is valid until the owning worker releases the alias.
#[derive(Debug)]
pub struct ConnectionHandle<C> {
    conn: Arc<C>,
    alias: String,
    tenant_id: Option<String>,
    schema: Option<String>,
    usage_count: u64,
    worker: WorkerId,
}

impl<C> ConnectionHandle<C> {
    /// Database alias
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Tenant the connection is bound to
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Schema bound on the connection at acquisition time
    pub fn bound_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Usage count at the time of acquisition
    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// Worker owning the connection
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Whether two handles share the same underlying connection
    pub fn same_connection(&self, other: &ConnectionHandle<C>) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }
}

impl<C> Deref for ConnectionHandle<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}
