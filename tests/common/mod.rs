//! Test utilities for Tenantpool
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tenantpool::config::{Config, PoolConfig};
use tenantpool::pool::{MemoryConnectionFactory, PoolManager};
use tenantpool::tenant::TenantContext;

/// Pool backed by the in-memory factory
pub type TestPool = PoolManager<MemoryConnectionFactory>;

/// Test configuration builder
pub struct TestConfigBuilder {
    max_connections: usize,
    min_connections: usize,
    lifetime_secs: u64,
    idle_timeout_secs: u64,
    max_usage_count: u64,
    connection_timeout_secs: u64,
    monitor_interval_secs: u64,
    critical_threshold: usize,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            max_connections: 10,
            min_connections: 0,
            lifetime_secs: 300,
            idle_timeout_secs: 60,
            max_usage_count: 1000,
            connection_timeout_secs: 5,
            monitor_interval_secs: 60,
            critical_threshold: 10,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection ceiling (and the alert threshold with it)
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self.critical_threshold = max;
        self
    }

    /// Set the connection lifetime
    pub fn lifetime_secs(mut self, secs: u64) -> Self {
        self.lifetime_secs = secs;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Set the usage budget
    pub fn max_usage_count(mut self, count: u64) -> Self {
        self.max_usage_count = count;
        self
    }

    /// Set the sweep interval
    pub fn monitor_interval_secs(mut self, secs: u64) -> Self {
        self.monitor_interval_secs = secs;
        self
    }

    /// Set the peak alert threshold
    pub fn critical_threshold(mut self, threshold: usize) -> Self {
        self.critical_threshold = threshold;
        self
    }

    /// Build the pool configuration
    pub fn build(self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connection_lifetime_seconds: self.lifetime_secs,
            idle_timeout_seconds: self.idle_timeout_secs,
            max_usage_count: self.max_usage_count,
            connection_timeout_seconds: self.connection_timeout_secs,
            monitor_interval_seconds: self.monitor_interval_secs,
            critical_connection_threshold: self.critical_threshold,
            ..Default::default()
        }
    }

    /// Build a root configuration
    pub fn build_config(self) -> Config {
        Config { pool: self.build() }
    }

    /// Build a pool over a fresh in-memory factory
    pub fn build_pool(self) -> (Arc<TestPool>, Arc<MemoryConnectionFactory>) {
        let factory = Arc::new(MemoryConnectionFactory::new());
        let pool = PoolManager::new(self.build(), factory.clone()).unwrap();
        (Arc::new(pool), factory)
    }
}

/// Tenant context bound to schema `tenant_<id>`
pub fn tenant(id: &str, alias: &str) -> TenantContext {
    TenantContext::new(id, alias).with_schema(format!("tenant_{}", id))
}
