//! Connection factory abstraction
//!
//! The pool never speaks the database protocol itself. A factory creates raw
//! connections for an alias, tunes their session, binds tenant schemas and
//! closes them.

use crate::config::PoolConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Baseline session settings applied to every new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Statement timeout in milliseconds
    pub statement_timeout_ms: u64,
    /// Lock timeout in milliseconds
    pub lock_timeout_ms: u64,
    /// Optional working memory hint
    pub work_mem: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            statement_timeout_ms: 30_000,
            lock_timeout_ms: 5_000,
            work_mem: None,
        }
    }
}

impl SessionSettings {
    /// Create session settings from the pool config
    pub fn from_pool_config(config: &PoolConfig) -> Self {
        SessionSettings {
            statement_timeout_ms: config.statement_timeout_ms,
            lock_timeout_ms: config.lock_timeout_ms,
            work_mem: config.work_mem.clone(),
        }
    }

    /// Render the settings as `SET` statements
    pub fn statements(&self) -> Vec<String> {
        let mut statements = vec![
            format!("SET statement_timeout = {}", self.statement_timeout_ms),
            format!("SET lock_timeout = {}", self.lock_timeout_ms),
        ];
        if let Some(work_mem) = &self.work_mem {
            statements.push(format!("SET work_mem = '{}'", work_mem.replace('\'', "''")));
        }
        statements
    }
}

/// Source of raw database connections
///
/// Errors from setting application, schema reset and idle reclaim are
/// logged by the pool and never surfaced to callers.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The raw connection type
    type Connection: Send + Sync + 'static;

    /// Open a new connection to `alias`
    async fn create(&self, alias: &str) -> Result<Self::Connection>;

    /// Apply baseline session settings
    async fn apply_settings(
        &self,
        conn: &Self::Connection,
        settings: &SessionSettings,
    ) -> Result<()>;

    /// Make `schema` the active schema of the session
    async fn bind_schema(&self, conn: &Self::Connection, schema: &str) -> Result<()>;

    /// Return the session to the neutral default schema
    async fn reset_schema(&self, conn: &Self::Connection) -> Result<()>;

    /// Close the connection
    async fn close(&self, conn: &Self::Connection) -> Result<()>;

    /// Whether the connection can still serve queries
    fn is_usable(&self, _conn: &Self::Connection) -> bool {
        true
    }

    /// Close source-level handles idle longer than `idle_timeout`
    ///
    /// Only handles no worker has checked out may be closed. Returns how
    /// many were closed.
    async fn reclaim_idle(&self, _idle_timeout: Duration) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_settings_default() {
        let settings = SessionSettings::default();
        assert_eq!(settings.statement_timeout_ms, 30_000);
        assert_eq!(settings.lock_timeout_ms, 5_000);
        assert!(settings.work_mem.is_none());
    }

    #[test]
    fn test_session_settings_from_pool_config() {
        let config = PoolConfig {
            statement_timeout_ms: 1_000,
            lock_timeout_ms: 200,
            work_mem: Some("64MB".to_string()),
            ..Default::default()
        };
        let settings = SessionSettings::from_pool_config(&config);
        assert_eq!(settings.statement_timeout_ms, 1_000);
        assert_eq!(settings.lock_timeout_ms, 200);
        assert_eq!(settings.work_mem.as_deref(), Some("64MB"));
    }

    #[test]
    fn test_session_settings_statements() {
        let settings = SessionSettings::default();
        assert_eq!(
            settings.statements(),
            vec![
                "SET statement_timeout = 30000".to_string(),
                "SET lock_timeout = 5000".to_string(),
            ]
        );

        let settings = SessionSettings {
            work_mem: Some("16MB".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.statements()[2], "SET work_mem = '16MB'");
    }

    #[test]
    fn test_session_settings_quotes_work_mem() {
        let settings = SessionSettings {
            work_mem: Some("1'MB".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.statements()[2], "SET work_mem = '1''MB'");
    }
}
