use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Time source shared by the registry and the health tracker so tests can
/// advance time deterministically.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for all interval arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the unix epoch.
    fn unix_millis(&self) -> u64;
}

/// Production clock backed by the host platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock whose time only moves when `advance` is called.
pub struct ManualClock {
    start: Instant,
    epoch_millis: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            epoch_millis: 1_700_000_000_000,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn unix_millis(&self) -> u64 {
        self.epoch_millis + self.offset.lock().as_millis() as u64
    }
}
