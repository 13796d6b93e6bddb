//! Connection pool configuration
//!
//! Defines the limits, recycling thresholds and session settings of the pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default hard ceiling on active connections
fn default_max_connections() -> usize {
    20
}

/// Default connection floor
fn default_min_connections() -> usize {
    3
}

/// Default maximum connection age in seconds
fn default_connection_lifetime_seconds() -> u64 {
    300
}

/// Default idle timeout in seconds
fn default_idle_timeout_seconds() -> u64 {
    60
}

/// Default maximum number of acquisitions served by one connection
fn default_max_usage_count() -> u64 {
    1000
}

/// Default connection creation timeout in seconds
fn default_connection_timeout_seconds() -> u64 {
    5
}

/// Default cleanup sweep interval in seconds
fn default_monitor_interval_seconds() -> u64 {
    60
}

/// Default peak count that raises an alert
fn default_critical_connection_threshold() -> usize {
    15
}

/// Default statement timeout in milliseconds
fn default_statement_timeout_ms() -> u64 {
    30_000
}

/// Default lock timeout in milliseconds
fn default_lock_timeout_ms() -> u64 {
    5_000
}

/// Connection pool configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PoolConfig {
    /// Hard ceiling on concurrently active connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Floor the scheduler reports against (informational)
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    /// Maximum age in seconds before a connection is recycled
    #[serde(default = "default_connection_lifetime_seconds")]
    pub connection_lifetime_seconds: u64,

    /// Idle time in seconds after which a connection may be reclaimed
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,

    /// Acquisitions served by one connection before it is recycled
    #[serde(default = "default_max_usage_count")]
    pub max_usage_count: u64,

    /// Maximum time to wait for a new connection to become usable
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,

    /// Cadence of the cleanup sweep
    #[serde(default = "default_monitor_interval_seconds")]
    pub monitor_interval_seconds: u64,

    /// Peak connection count that triggers an alert
    #[serde(default = "default_critical_connection_threshold")]
    pub critical_connection_threshold: usize,

    /// Statement timeout applied to every new session
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Lock timeout applied to every new session
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Optional working memory hint (e.g. "16MB")
    #[serde(default)]
    pub work_mem: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_lifetime_seconds: default_connection_lifetime_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            max_usage_count: default_max_usage_count(),
            connection_timeout_seconds: default_connection_timeout_seconds(),
            monitor_interval_seconds: default_monitor_interval_seconds(),
            critical_connection_threshold: default_critical_connection_threshold(),
            statement_timeout_ms: default_statement_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            work_mem: None,
        }
    }
}

impl PoolConfig {
    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.min_connections > self.max_connections {
            return Err("min_connections cannot be greater than max_connections".to_string());
        }
        if self.critical_connection_threshold == 0 {
            return Err("critical_connection_threshold must be greater than 0".to_string());
        }
        if self.max_usage_count == 0 {
            return Err("max_usage_count must be greater than 0".to_string());
        }
        if self.monitor_interval_seconds == 0 {
            return Err("monitor_interval_seconds must be greater than 0".to_string());
        }
        if let Some(work_mem) = &self.work_mem {
            if work_mem.trim().is_empty() {
                return Err("work_mem must not be empty when set".to_string());
            }
        }
        Ok(())
    }

    /// Maximum connection age
    pub fn connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.connection_lifetime_seconds)
    }

    /// Idle time before reclaim eligibility
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Connection creation timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    /// Cleanup sweep interval
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }
}
