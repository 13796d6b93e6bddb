//! Connection pool module for Tenantpool
//!
//! This module provides the tenant-aware pool manager together with its
//! per-worker caches, statistics registry, cleanup scheduler and the
//! connection factory seam.

mod cache;
mod factory;
mod guard;
mod manager;
mod memory;
mod record;
mod scheduler;
mod sink;
mod stats;

pub use cache::{WorkerCaches, WorkerId};
pub use factory::{ConnectionFactory, SessionSettings};
pub use guard::WorkerReleaseGuard;
pub use manager::PoolManager;
pub use memory::{MemoryConnection, MemoryConnectionFactory};
pub use record::{ConnectionHandle, ConnectionRecord};
pub use scheduler::{CleanupScheduler, SweepPermit};
pub use sink::{AlertKind, AlertPayload, MetricsSink, TracingSink};
pub use stats::{Admission, SampleWindow, StatsRegistry, StatsSnapshot, SAMPLE_CAPACITY};
