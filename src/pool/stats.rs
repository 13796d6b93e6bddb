//! Process-wide pool statistics
//!
//! All counters live behind a single lock. Sample windows are trimmed in the
//! same critical section that appends to them.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Number of most recent samples retained per window
pub const SAMPLE_CAPACITY: usize = 100;

/// Bounded FIFO of duration samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl SampleWindow {
    /// Create a window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        SampleWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest ones beyond capacity
    pub fn push(&mut self, sample: Duration) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean of the retained samples
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Copy the samples, oldest first
    pub fn to_vec(&self) -> Vec<Duration> {
        self.samples.iter().copied().collect()
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        SampleWindow::new(SAMPLE_CAPACITY)
    }
}

/// Result of admitting one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Active connections including the admitted one
    pub active: usize,
}

#[derive(Debug)]
struct StatsState {
    active_connections: usize,
    peak_connections: usize,
    total_requests: u64,
    connection_errors: u64,
    connection_timeouts: u64,
    reuse_count: u64,
    recycled_count: u64,
    reclaimed_count: u64,
    longest_running_connection: Duration,
    average_connection_lifetime: Duration,
    connection_ages: SampleWindow,
    connection_wait_times: SampleWindow,
    tenant_connection_counts: HashMap<String, usize>,
    reset_at: Instant,
}

impl StatsState {
    fn new() -> Self {
        StatsState {
            active_connections: 0,
            peak_connections: 0,
            total_requests: 0,
            connection_errors: 0,
            connection_timeouts: 0,
            reuse_count: 0,
            recycled_count: 0,
            reclaimed_count: 0,
            longest_running_connection: Duration::ZERO,
            average_connection_lifetime: Duration::ZERO,
            connection_ages: SampleWindow::default(),
            connection_wait_times: SampleWindow::default(),
            tenant_connection_counts: HashMap::new(),
            reset_at: Instant::now(),
        }
    }

    fn decrement_tenant(&mut self, tenant: Option<&str>) {
        let Some(tenant) = tenant else { return };
        if let Some(count) = self.tenant_connection_counts.get_mut(tenant) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.tenant_connection_counts.remove(tenant);
            }
        }
    }
}

/// Point-in-time copy of the pool statistics
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub active_connections: usize,
    pub peak_connections: usize,
    pub total_requests: u64,
    pub connection_errors: u64,
    pub connection_timeouts: u64,
    pub reuse_count: u64,
    pub recycled_count: u64,
    pub reclaimed_count: u64,
    pub longest_running_connection: Duration,
    pub average_connection_lifetime: Duration,
    pub average_wait_time: Duration,
    pub connection_ages: Vec<Duration>,
    pub connection_wait_times: Vec<Duration>,
    pub tenant_connection_counts: BTreeMap<String, usize>,
    /// Time since the registry was created or last reset
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Live connections held for `tenant`
    pub fn tenant_connections(&self, tenant: &str) -> usize {
        self.tenant_connection_counts.get(tenant).copied().unwrap_or(0)
    }
}

/// Shared statistics registry
#[derive(Debug)]
pub struct StatsRegistry {
    state: Mutex<StatsState>,
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRegistry {
    /// Create a zeroed registry
    pub fn new() -> Self {
        StatsRegistry {
            state: Mutex::new(StatsState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a new admission: active, total requests and tenant count
    ///
    /// The peak is left alone until the acquisition is granted, see
    /// [`record_peak`](Self::record_peak).
    pub fn admit(&self, tenant: Option<&str>) -> Admission {
        let mut state = self.lock();
        state.active_connections += 1;
        state.total_requests += 1;
        if let Some(tenant) = tenant {
            *state
                .tenant_connection_counts
                .entry(tenant.to_string())
                .or_insert(0) += 1;
        }

        Admission {
            active: state.active_connections,
        }
    }

    /// Raise the peak to `level` for a granted acquisition
    ///
    /// Returns the new peak when it was raised.
    pub fn record_peak(&self, level: usize) -> Option<usize> {
        let mut state = self.lock();
        if level > state.peak_connections {
            state.peak_connections = level;
            Some(level)
        } else {
            None
        }
    }

    /// Undo a previous [`admit`](Self::admit) for a failed acquisition
    pub fn rollback_admission(&self, tenant: Option<&str>) {
        let mut state = self.lock();
        state.active_connections = state.active_connections.saturating_sub(1);
        state.total_requests = state.total_requests.saturating_sub(1);
        state.decrement_tenant(tenant);
    }

    /// Record a new connection entering service after waiting `wait`
    pub fn record_opened(&self, wait: Duration) {
        let mut state = self.lock();
        state.connection_ages.push(Duration::ZERO);
        state.connection_wait_times.push(wait);
    }

    /// Record a cached connection being handed out again
    pub fn record_reuse(&self) {
        self.lock().reuse_count += 1;
    }

    /// Record the wait time of a cache hit
    pub fn record_wait(&self, wait: Duration) {
        self.lock().connection_wait_times.push(wait);
    }

    /// Record a connection leaving service after living for `age`
    pub fn record_release(&self, tenant: Option<&str>, age: Duration) {
        let mut state = self.lock();
        state.connection_ages.push(age);
        if age > state.longest_running_connection {
            state.longest_running_connection = age;
        }
        state.average_connection_lifetime = state.connection_ages.average();
        state.active_connections = state.active_connections.saturating_sub(1);
        state.decrement_tenant(tenant);
    }

    /// Record a failed acquisition
    pub fn record_error(&self) {
        self.lock().connection_errors += 1;
    }

    /// Record a connection creation that timed out
    pub fn record_timeout(&self) {
        let mut state = self.lock();
        state.connection_timeouts += 1;
        state.connection_errors += 1;
    }

    /// Record connections recycled for age or usage
    pub fn record_recycled(&self, count: usize) {
        self.lock().recycled_count += count as u64;
    }

    /// Record connections reclaimed under admission pressure
    pub fn record_reclaimed(&self, count: usize) {
        self.lock().reclaimed_count += count as u64;
    }

    /// Current active connection count
    pub fn active_connections(&self) -> usize {
        self.lock().active_connections
    }

    /// Live connections held for `tenant`
    pub fn tenant_connections(&self, tenant: &str) -> usize {
        self.lock()
            .tenant_connection_counts
            .get(tenant)
            .copied()
            .unwrap_or(0)
    }

    /// Get a consistent copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.lock();
        StatsSnapshot {
            active_connections: state.active_connections,
            peak_connections: state.peak_connections,
            total_requests: state.total_requests,
            connection_errors: state.connection_errors,
            connection_timeouts: state.connection_timeouts,
            reuse_count: state.reuse_count,
            recycled_count: state.recycled_count,
            reclaimed_count: state.reclaimed_count,
            longest_running_connection: state.longest_running_connection,
            average_connection_lifetime: state.average_connection_lifetime,
            average_wait_time: state.connection_wait_times.average(),
            connection_ages: state.connection_ages.to_vec(),
            connection_wait_times: state.connection_wait_times.to_vec(),
            tenant_connection_counts: state
                .tenant_connection_counts
                .iter()
                .map(|(tenant, count)| (tenant.clone(), *count))
                .collect(),
            uptime: state.reset_at.elapsed(),
        }
    }

    /// Zero cumulative counters, keeping active and per-tenant counts
    ///
    /// The peak restarts from the current active count.
    pub fn reset(&self) {
        let mut state = self.lock();
        let active = state.active_connections;
        let tenants = std::mem::take(&mut state.tenant_connection_counts);

        *state = StatsState::new();
        state.active_connections = active;
        state.peak_connections = active;
        state.tenant_connection_counts = tenants;
    }
}
