use std::collections::HashMap;
use std::time::Instant;

/// Closed set of proxy-related keys the core stamps onto each outbound
/// request. The downloader carries this alongside the request and hands it
/// back untouched.
#[derive(Debug, Clone, Default)]
pub struct ProxyMeta {
    pub proxy: Option<String>,
    pub proxy_session_id: Option<String>,
    pub proxy_created_at: Option<u64>,
    pub proxy_requests_count: Option<u32>,
    pub brightdata_enabled: bool,
    pub request_start_time: Option<Instant>,
    pub brightdata_retry_count: u32,
    pub skip_brightdata_proxy: bool,
    /// Session the previous attempt failed on; never reselected for the
    /// retry.
    pub(crate) excluded_session: Option<String>,
    /// Header names the middleware itself injected, so a retry can shed
    /// them before the next session overlays its own fingerprint.
    pub(crate) injected_headers: Vec<String>,
}

impl ProxyMeta {
    /// Strip proxy state so the next interception pass acquires a fresh
    /// session.
    pub(crate) fn clear_proxy(&mut self) {
        self.proxy = None;
        self.proxy_session_id = None;
        self.proxy_created_at = None;
        self.proxy_requests_count = None;
        self.brightdata_enabled = false;
        self.request_start_time = None;
    }
}

/// Outbound request as the core sees it: a URL, a header map and the proxy
/// meta side-channel.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub meta: ProxyMeta,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            meta: ProxyMeta::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Opt this request out of proxy interception.
    pub fn skip_proxy(mut self) -> Self {
        self.meta.skip_brightdata_proxy = true;
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeResponse {
    pub url: String,
    pub status: u16,
}

impl ScrapeResponse {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
        }
    }
}
