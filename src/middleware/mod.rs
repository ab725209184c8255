// Request/response interception: skip rules, session attachment, outcome
// classification and retry-with-a-different-session.

pub mod classify;
pub mod meta;
pub mod proxy;

pub use classify::{classify_status, is_successful_status, TransportError};
pub use meta::{ProxyMeta, ScrapeRequest, ScrapeResponse};
pub use proxy::{ProxyMiddleware, ResponseVerdict};
