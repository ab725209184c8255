use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::clock::Clock;

use super::metrics::{FailureKind, HealthMetrics};

/// Outcome of a failure record, handed back to the caller so it can ask the
/// registry to blacklist the session.
#[derive(Debug, Clone, Copy)]
pub struct FailureReport {
    pub success_rate: f64,
    pub should_blacklist: bool,
}

const BLACKLIST_SUCCESS_RATE: f64 = 50.0;
const BLACKLIST_MIN_REQUESTS: u64 = 10;

/// Per-session rolling health metrics, keyed by session id. Outcomes for
/// ids the tracker has never seen start from a zero-initialised entry, so
/// late results from retired sessions still land somewhere consistent.
pub struct HealthTracker {
    metrics: DashMap<String, HealthMetrics>,
    clock: Arc<dyn Clock>,
}

impl HealthTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics: DashMap::new(),
            clock,
        }
    }

    pub fn record_success(&self, session_id: &str, response_time_secs: f64) {
        let now = self.clock.now();
        let mut metrics = self.metrics.entry(session_id.to_string()).or_default();
        metrics.requests_sent += 1;
        metrics.successful_requests += 1;
        metrics.last_used = Some(now);
        metrics.last_success = Some(now);
        if response_time_secs > 0.0 {
            metrics.push_response_time(response_time_secs);
        }
        tracing::debug!(
            session = session_id,
            success_rate = %format_args!("{:.1}", metrics.success_rate()),
            "recorded success"
        );
    }

    pub fn record_failure(&self, session_id: &str, kind: FailureKind) -> FailureReport {
        let now = self.clock.now();
        let mut metrics = self.metrics.entry(session_id.to_string()).or_default();
        metrics.requests_sent += 1;
        metrics.failed_requests += 1;
        metrics.last_used = Some(now);
        metrics.last_failure = Some(now);
        metrics.count_failure(kind);

        let success_rate = metrics.success_rate();
        let should_blacklist = success_rate < BLACKLIST_SUCCESS_RATE
            && metrics.requests_sent > BLACKLIST_MIN_REQUESTS;

        tracing::debug!(
            session = session_id,
            kind = kind.key(),
            success_rate = %format_args!("{:.1}", success_rate),
            "recorded failure"
        );

        FailureReport {
            success_rate,
            should_blacklist,
        }
    }

    /// Sessions without history count as healthy: a fresh session has not
    /// had a chance to fail yet.
    pub fn is_healthy(&self, session_id: &str, now: Instant) -> bool {
        self.metrics
            .get(session_id)
            .map(|m| m.is_healthy(now))
            .unwrap_or(true)
    }

    pub fn success_rate(&self, session_id: &str) -> f64 {
        self.metrics
            .get(session_id)
            .map(|m| m.success_rate())
            .unwrap_or(100.0)
    }

    pub fn snapshot(&self, session_id: &str) -> Option<HealthMetrics> {
        self.metrics
            .get(session_id)
            .map(|metrics| metrics.value().clone())
    }

    /// Totals across every tracked session: (sent, successful, failed).
    pub fn totals(&self) -> (u64, u64, u64) {
        let mut sent = 0;
        let mut successful = 0;
        let mut failed = 0;
        for entry in self.metrics.iter() {
            sent += entry.requests_sent;
            successful += entry.successful_requests;
            failed += entry.failed_requests;
        }
        (sent, successful, failed)
    }

    /// Explicit post-mortem cleanup; retired sessions keep their metrics
    /// until the embedding decides it is done with them.
    pub fn prune(&self, session_ids: &[String]) {
        for id in session_ids {
            self.metrics.remove(id);
        }
    }
}
