//! Alert sink for pool observability signals

use std::fmt;
use tracing::warn;

/// Kind of alert raised by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Peak connections reached the critical threshold
    CriticalPeak,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::CriticalPeak => write!(f, "critical_peak"),
        }
    }
}

/// Context carried with an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    /// New peak connection count
    pub peak_connections: usize,
    /// Configured critical threshold
    pub threshold: usize,
    /// Alias whose acquisition raised the peak
    pub alias: String,
    /// Tenant whose acquisition raised the peak
    pub tenant_id: Option<String>,
}

/// Receiver of pool alerts
///
/// Called inline on the acquire path, so implementations must not block.
pub trait MetricsSink: Send + Sync {
    /// Handle an alert
    fn on_alert(&self, kind: AlertKind, payload: &AlertPayload);
}

/// Sink that logs alerts as warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn on_alert(&self, kind: AlertKind, payload: &AlertPayload) {
        warn!(
            alert = %kind,
            peak = payload.peak_connections,
            threshold = payload.threshold,
            alias = %payload.alias,
            tenant = payload.tenant_id.as_deref().unwrap_or("-"),
            "Connection peak reached critical threshold"
        );
    }
}
