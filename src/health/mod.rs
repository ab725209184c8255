// Per-session health accounting and the feedback loop that drives
// blacklisting decisions.

pub mod metrics;
pub mod tracker;

pub use metrics::{FailureKind, HealthMetrics};
pub use tracker::{FailureReport, HealthTracker};
