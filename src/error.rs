//! Error types for Tenantpool
//!
//! This module defines the error taxonomy surfaced by the pool manager.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the pool
pub type Result<T> = std::result::Result<T, PoolError>;

/// Main error type for pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// Admission control rejected the acquisition after reclaiming failed
    #[error("Pool exhausted acquiring '{alias}': {active} active connections exceed limit of {max}")]
    PoolExhausted {
        /// Requested database alias
        alias: String,
        /// Active connections observed at rejection time (including the rejected one)
        active: usize,
        /// Configured ceiling
        max: usize,
    },

    /// Tenant schema could not be bound on a live connection
    #[error("Failed to bind schema '{schema}' on '{alias}': {reason}")]
    SchemaBindFailed {
        /// Database alias
        alias: String,
        /// Tenant schema name
        schema: String,
        /// Underlying failure
        reason: String,
    },

    /// The connection factory could not produce a usable connection
    #[error("Failed to create connection for '{alias}': {reason}")]
    ConnectionCreateFailed {
        /// Database alias
        alias: String,
        /// Underlying failure
        reason: String,
    },

    /// Connection creation did not finish within the configured timeout
    #[error("Timed out after {timeout:?} creating connection for '{alias}'")]
    ConnectionTimeout {
        /// Database alias
        alias: String,
        /// Configured connection timeout
        timeout: Duration,
    },

    /// Alias was empty
    #[error("Database alias must not be empty")]
    InvalidAlias,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Whether the caller may reasonably retry the operation after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. } | PoolError::ConnectionTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::PoolExhausted {
            alias: "db".to_string(),
            active: 3,
            max: 2,
        };
        assert_eq!(
            format!("{}", err),
            "Pool exhausted acquiring 'db': 3 active connections exceed limit of 2"
        );

        let err = PoolError::SchemaBindFailed {
            alias: "db".to_string(),
            schema: "tenant_a".to_string(),
            reason: "no such schema".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Failed to bind schema 'tenant_a' on 'db': no such schema"
        );

        let err = PoolError::ConnectionCreateFailed {
            alias: "db".to_string(),
            reason: "auth failed".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Failed to create connection for 'db': auth failed"
        );

        let err = PoolError::InvalidAlias;
        assert_eq!(format!("{}", err), "Database alias must not be empty");

        let err = PoolError::Config("bad".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad");
    }

    #[test]
    fn test_pool_error_timeout_display() {
        let err = PoolError::ConnectionTimeout {
            alias: "reports".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            format!("{}", err),
            "Timed out after 5s creating connection for 'reports'"
        );
    }

    #[test]
    fn test_pool_error_is_retryable() {
        assert!(PoolError::PoolExhausted {
            alias: "db".to_string(),
            active: 1,
            max: 1,
        }
        .is_retryable());
        assert!(PoolError::ConnectionTimeout {
            alias: "db".to_string(),
            timeout: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!PoolError::InvalidAlias.is_retryable());
        assert!(!PoolError::SchemaBindFailed {
            alias: "db".to_string(),
            schema: "s".to_string(),
            reason: "r".to_string(),
        }
        .is_retryable());
    }
}
