//! Prometheus metrics endpoint

use axum::response::IntoResponse;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local counters exposed for Prometheus
#[derive(Default)]
pub struct Metrics {
    /// Data endpoint calls
    pub requests_total: AtomicU64,
    /// Requests answered with a diagnostic body
    pub resolution_errors_total: AtomicU64,
    /// Requests answered by an override rule
    pub rule_matches_total: AtomicU64,
    /// Transaction records that could not be written
    pub record_failures_total: AtomicU64,
    /// Management endpoint calls
    pub management_requests_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolution_errors(&self) {
        self.resolution_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rule_matches(&self) {
        self.rule_matches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_record_failures(&self) {
        self.record_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_management(&self) {
        self.management_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            resolution_errors_total: self.resolution_errors_total.load(Ordering::Relaxed),
            rule_matches_total: self.rule_matches_total.load(Ordering::Relaxed),
            record_failures_total: self.record_failures_total.load(Ordering::Relaxed),
            management_requests_total: self.management_requests_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub resolution_errors_total: u64,
    pub rule_matches_total: u64,
    pub record_failures_total: u64,
    pub management_requests_total: u64,
}

/// GET /metrics
///
/// Returns Prometheus-format metrics
pub async fn prometheus_metrics(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> impl IntoResponse {
    let snapshot = state.metrics.get_metrics();

    let output = format!(
        r#"# HELP httplogger_requests_total Total number of data endpoint requests
# TYPE httplogger_requests_total counter
httplogger_requests_total {}

# HELP httplogger_resolution_errors_total Requests answered with a diagnostic body
# TYPE httplogger_resolution_errors_total counter
httplogger_resolution_errors_total {}

# HELP httplogger_rule_matches_total Requests answered by a path override rule
# TYPE httplogger_rule_matches_total counter
httplogger_rule_matches_total {}

# HELP httplogger_record_failures_total Transaction records that could not be written
# TYPE httplogger_record_failures_total counter
httplogger_record_failures_total {}

# HELP httplogger_management_requests_total Total number of management requests
# TYPE httplogger_management_requests_total counter
httplogger_management_requests_total {}

# HELP httplogger_info Build information
# TYPE httplogger_info gauge
httplogger_info{{version="{}"}} 1
"#,
        snapshot.requests_total,
        snapshot.resolution_errors_total,
        snapshot.rule_matches_total,
        snapshot.record_failures_total,
        snapshot.management_requests_total,
        env!("CARGO_PKG_VERSION"),
    );

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}
