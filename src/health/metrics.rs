use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

pub(crate) const RESPONSE_TIME_WINDOW: usize = 100;
const RECENT_SUCCESS_WINDOW: Duration = Duration::from_secs(5 * 60);
const WARMUP_REQUESTS: u64 = 5;

/// Failure taxonomy for proxy-attributable outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Blocked,
    RateLimited,
    ServerError,
    HttpError,
    Timeout,
    ConnectionError,
    Unknown,
}

impl FailureKind {
    /// Key used in log fields and stats counters (`brightdata/<key>_requests`).
    pub fn key(&self) -> &'static str {
        match self {
            FailureKind::Blocked => "blocked",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::HttpError => "http_error",
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionError => "connection_error",
            FailureKind::Unknown => "unknown_error",
        }
    }
}

/// Rolling outcome history for one proxy session. Entries outlive the
/// session itself so post-mortems stay available until explicitly pruned.
#[derive(Debug, Clone, Default)]
pub struct HealthMetrics {
    pub requests_sent: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub blocked_requests: u64,
    pub rate_limited_requests: u64,
    pub server_error_requests: u64,
    pub http_error_requests: u64,
    pub timeout_requests: u64,
    pub connection_error_requests: u64,
    pub unknown_requests: u64,
    pub last_used: Option<Instant>,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub average_response_time: f64,
    response_times: VecDeque<f64>,
}

impl HealthMetrics {
    /// Success rate in percent. A session with no traffic yet counts as 100.
    pub fn success_rate(&self) -> f64 {
        if self.requests_sent == 0 {
            return 100.0;
        }
        self.successful_requests as f64 / self.requests_sent as f64 * 100.0
    }

    /// Eligible for selection: the session keeps succeeding, or is still
    /// warming up.
    pub fn is_healthy(&self, now: Instant) -> bool {
        if self.success_rate() < 80.0 {
            return false;
        }
        if let Some(last_success) = self.last_success {
            return now.duration_since(last_success) < RECENT_SUCCESS_WINDOW;
        }
        self.requests_sent < WARMUP_REQUESTS
    }

    pub(crate) fn push_response_time(&mut self, seconds: f64) {
        if self.response_times.len() == RESPONSE_TIME_WINDOW {
            self.response_times.pop_front();
        }
        self.response_times.push_back(seconds);
        self.average_response_time =
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64;
    }

    pub(crate) fn count_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Blocked => self.blocked_requests += 1,
            FailureKind::RateLimited => self.rate_limited_requests += 1,
            FailureKind::ServerError => self.server_error_requests += 1,
            FailureKind::HttpError => self.http_error_requests += 1,
            FailureKind::Timeout => self.timeout_requests += 1,
            FailureKind::ConnectionError => self.connection_error_requests += 1,
            FailureKind::Unknown => self.unknown_requests += 1,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.response_times.len()
    }
}
