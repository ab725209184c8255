// Session pool: sticky proxy identities, their lifecycle and the blacklist.

pub mod proxy_session;
pub mod registry;

pub use proxy_session::{short_id, ProxySession, SessionLease, SESSION_ID_PREFIX};
pub use registry::{CleanupReport, SessionRegistry};
