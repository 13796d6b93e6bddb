//! Cleanup scheduling
//!
//! Decides when a recycle sweep is due and carries the shutdown signal of
//! the optional background monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Tracks sweep cadence for one pool
pub struct CleanupScheduler {
    /// Minimum time between sweeps
    interval: Duration,
    /// When the last sweep started
    last_sweep: Mutex<Instant>,
    /// Whether a sweep is running
    sweeping: AtomicBool,
    /// Shutdown signal
    shutdown: Notify,
    /// Whether shutdown has been requested
    is_shutdown: AtomicBool,
}

/// Held while a sweep runs; clears the running flag on drop
pub struct SweepPermit<'a> {
    scheduler: &'a CleanupScheduler,
}

impl Drop for SweepPermit<'_> {
    fn drop(&mut self) {
        self.scheduler.sweeping.store(false, Ordering::Release);
    }
}

impl CleanupScheduler {
    /// Create a scheduler whose first sweep is due one interval from now
    pub fn new(interval: Duration) -> Self {
        CleanupScheduler {
            interval,
            last_sweep: Mutex::new(Instant::now()),
            sweeping: AtomicBool::new(false),
            shutdown: Notify::new(),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Sweep interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time since the last sweep started
    pub fn since_last_sweep(&self) -> Duration {
        self.last_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Whether the last sweep is older than the interval
    pub fn is_due(&self) -> bool {
        self.since_last_sweep() >= self.interval
    }

    /// Claim a due sweep; `None` if not due or another sweep is running
    pub fn try_begin(&self) -> Option<SweepPermit<'_>> {
        if !self.is_due() {
            return None;
        }
        self.begin()
    }

    /// Claim a sweep regardless of cadence; `None` if one is running
    pub fn begin(&self) -> Option<SweepPermit<'_>> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        *self
            .last_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        Some(SweepPermit { scheduler: self })
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait for shutdown signal
    pub async fn wait_shutdown(&self) {
        if self.is_shutdown() {
            return;
        }
        self.shutdown.notified().await;
    }
}
