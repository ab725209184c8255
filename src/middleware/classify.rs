use std::fmt;

use crate::health::FailureKind;

/// Status codes where switching to a fresh session is worth a retry.
const RETRY_STATUSES: [u16; 5] = [403, 429, 502, 503, 504];

/// 2xx/3xx fetched fine; 404 means the product is gone, which is still a
/// clean fetch from the proxy's point of view.
pub fn is_successful_status(status: u16) -> bool {
    (200..400).contains(&status) || status == 404
}

pub fn classify_status(status: u16) -> FailureKind {
    match status {
        403 => FailureKind::Blocked,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::HttpError,
    }
}

pub fn should_retry_status(status: u16) -> bool {
    RETRY_STATUSES.contains(&status)
}

/// Transport-level failure surfaced by the downloader instead of a
/// response. Connect-stage faults (DNS lookups included) all land in
/// `ConnectionRefused`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    ConnectionRefused,
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Timeout => FailureKind::Timeout,
            TransportError::ConnectionRefused => FailureKind::ConnectionError,
            TransportError::Other(_) => FailureKind::Unknown,
        }
    }

    /// Only transport faults that smell like a dead proxy path are worth a
    /// retry; anything unknown propagates.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Timeout | FailureKind::ConnectionError
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timeout"),
            TransportError::ConnectionRefused => write!(f, "connection refused"),
            TransportError::Other(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<&reqwest::Error> for TransportError {
    fn from(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::ConnectionRefused
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
