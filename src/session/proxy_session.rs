use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BrightdataConfig;

pub const SESSION_ID_PREFIX: &str = "scraper-";

/// First hex chars of a session id, for logs and stats rows.
pub fn short_id(session_id: &str) -> &str {
    let hex = session_id
        .strip_prefix(SESSION_ID_PREFIX)
        .unwrap_or(session_id);
    &hex[..hex.len().min(8)]
}

/// A sticky upstream identity: while the session lives, every request it
/// fronts leaves through the same residential IP.
#[derive(Debug, Clone)]
pub struct ProxySession {
    pub session_id: String,
    pub config: Arc<BrightdataConfig>,
    pub created_at: Instant,
    pub created_at_millis: u64,
    pub last_used: Instant,
    pub requests_count: u32,
    pub max_requests: u32,
    pub max_duration: Duration,
}

impl ProxySession {
    pub fn new(
        session_id: String,
        config: Arc<BrightdataConfig>,
        now: Instant,
        unix_millis: u64,
        max_requests: u32,
        max_duration: Duration,
    ) -> Self {
        Self {
            session_id,
            config,
            created_at: now,
            created_at_millis: unix_millis,
            last_used: now,
            requests_count: 0,
            max_requests,
            max_duration,
        }
    }

    /// Expired once the age or request cap is hit; expired sessions are
    /// swept on the next cleanup and never selected again.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.max_duration
            || self.requests_count >= self.max_requests
    }

    pub fn proxy_url(&self) -> String {
        self.config.session_url(&self.session_id)
    }

    /// Mark the session used for one more outbound request.
    pub fn touch(&mut self, now: Instant) {
        self.last_used = now;
        self.requests_count += 1;
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.session_id)
    }
}

/// By-value snapshot handed to request processing. Holding a lease never
/// keeps a retired session alive; late outcomes carry only the id.
#[derive(Debug, Clone)]
pub struct SessionLease {
    pub session_id: String,
    pub proxy_url: String,
    pub created_at_millis: u64,
    pub requests_count: u32,
}
