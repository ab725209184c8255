// Browser fingerprint catalog and per-session coordination.
// A session keeps one coherent User-Agent + header set for its whole life.

pub mod coordinator;
pub mod pool;
pub mod profile;

pub use coordinator::{FingerprintCoordinator, FingerprintStats};
pub use pool::{BrowserProfilePool, PROFILE_POOL};
pub use profile::{BrowserFamily, BrowserProfile, Platform};
