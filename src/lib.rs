//! # Tenantpool - Tenant-Aware Connection Pool Manager
//!
//! Tenantpool hands out database connections to concurrent units of work,
//! binding each one to the tenant schema of the caller. Every worker caches
//! at most one connection per database alias; a process-wide ceiling gates
//! new connections and aged or over-used ones are recycled.
//!
//! ## Features
//!
//! - **Admission Control**: Fail-fast ceiling with a bounded idle reclaim
//! - **Tenant Schemas**: Connections are bound to the caller's schema on acquire
//! - **Recycling**: Usage and lifetime budgets, checked on reuse and by sweeps
//! - **Statistics**: Counters, bounded samples and per-tenant connection counts
//! - **Pluggable Backends**: Connections come from a [`pool::ConnectionFactory`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantpool::config::PoolConfig;
//! use tenantpool::pool::{MemoryConnectionFactory, PoolManager};
//! use tenantpool::tenant::TenantContext;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = Arc::new(MemoryConnectionFactory::new());
//!     let pool = PoolManager::new(PoolConfig::default(), factory)?;
//!
//!     let tenant = TenantContext::new("acme", "main").with_schema("acme");
//!     let conn = pool.acquire("main", Some(&tenant)).await?;
//!     conn.execute("SELECT 1")?;
//!     pool.release("main").await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! RequestAdapter -> PoolManager -> WorkerCaches / StatsRegistry -> ConnectionFactory
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod helper;
pub mod pool;
pub mod tenant;

// Re-export commonly used items
pub use adapter::{RequestAdapter, RequestTimingSnapshot};
pub use config::{load_config, Config, PoolConfig};
pub use error::PoolError;
pub use pool::{ConnectionFactory, ConnectionHandle, PoolManager, StatsSnapshot, WorkerId};
pub use tenant::{TenantContext, TenantContextProvider};

/// Version of the Tenantpool library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "tenantpool");
    }
}
