use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{BrightdataConfig, RotationSettings};
use crate::fingerprint::FingerprintCoordinator;
use crate::health::{FailureKind, HealthTracker};
use crate::rotation::Rotator;
use crate::session::{short_id, SessionRegistry};
use crate::stats::{ProxyStats, StatsSink};

use super::classify::{
    classify_status, is_successful_status, should_retry_status, TransportError,
};
use super::meta::{ScrapeRequest, ScrapeResponse};

/// Meta files that never go through the proxy pool.
const SKIP_URL_PATTERNS: [&str; 3] = ["/robots.txt", "/favicon.ico", "/sitemap"];

/// Outcome of response interception: hand the response to the caller, or
/// replay the request through a fresh session.
#[derive(Debug)]
pub enum ResponseVerdict {
    Pass(ScrapeResponse),
    Retry(ScrapeRequest),
}

/// Request/response interceptor tying the session pool, the health
/// feedback loop and the fingerprint coordination together.
pub struct ProxyMiddleware {
    enabled: bool,
    settings: RotationSettings,
    registry: Arc<SessionRegistry>,
    tracker: Arc<HealthTracker>,
    rotator: Rotator,
    fingerprints: Arc<FingerprintCoordinator>,
    sink: Arc<dyn StatsSink>,
    clock: Arc<dyn Clock>,
}

impl ProxyMiddleware {
    pub fn new(
        config: Option<BrightdataConfig>,
        settings: RotationSettings,
        sink: Arc<dyn StatsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let enabled = settings.use_proxies && config.is_some();
        if settings.use_proxies && config.is_none() {
            tracing::warn!(
                "USE_PROXIES is set but no provider credentials are available, traffic stays unproxied"
            );
        }
        if enabled {
            tracing::info!(
                max_sessions = settings.max_sessions,
                rotation_interval = settings.rotation_interval,
                strategy = ?settings.strategy,
                "proxy middleware initialized"
            );
        } else {
            tracing::info!("proxy middleware disabled");
        }

        let config = if enabled { config.map(Arc::new) } else { None };
        let registry = Arc::new(SessionRegistry::new(config, &settings, clock.clone()));
        let tracker = Arc::new(HealthTracker::new(clock.clone()));
        let fingerprints = Arc::new(FingerprintCoordinator::new());

        // Retirement feeds straight back into the fingerprint cache.
        {
            let fingerprints = fingerprints.clone();
            registry.on_retire(move |ids| fingerprints.forget(ids));
        }

        sink.set_value("brightdata/enabled", enabled as i64);

        Self {
            enabled,
            rotator: Rotator::new(settings.strategy),
            settings,
            registry,
            tracker,
            fingerprints,
            sink,
            clock,
        }
    }

    /// Construct from `BRIGHTDATA_*` / `USE_PROXIES` environment variables.
    pub fn from_env(sink: Arc<dyn StatsSink>) -> Self {
        let settings = RotationSettings::from_env();
        let config = match BrightdataConfig::from_env() {
            Ok(config) => Some(config),
            Err(err) => {
                if settings.use_proxies {
                    tracing::warn!(error = %err, "Brightdata configuration incomplete");
                }
                None
            }
        };
        Self::new(config, settings, sink, Arc::new(SystemClock))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    pub fn fingerprints(&self) -> &FingerprintCoordinator {
        &self.fingerprints
    }

    /// Attach a proxy session and its fingerprint to the request. No-op for
    /// disabled cores, manual proxy overrides, skip-listed URLs and opted
    /// out requests; an empty pool leaves the request unproxied with a
    /// warning.
    pub fn on_request(&self, request: &mut ScrapeRequest) {
        if !self.enabled || request.meta.proxy.is_some() || self.should_skip(request) {
            return;
        }

        let exclude = request.meta.excluded_session.clone();
        let Some(lease) = self
            .registry
            .acquire(&self.rotator, &self.tracker, exclude.as_deref())
        else {
            tracing::warn!(url = %request.url, "no proxy session available, request proceeds unproxied");
            return;
        };

        request.meta.proxy = Some(lease.proxy_url.clone());
        request.meta.proxy_session_id = Some(lease.session_id.clone());
        request.meta.proxy_created_at = Some(lease.created_at_millis);
        request.meta.proxy_requests_count = Some(lease.requests_count);
        request.meta.brightdata_enabled = true;
        request.meta.request_start_time = Some(self.clock.now());

        if !request.has_header("User-Agent") {
            let mut injected = Vec::new();
            for (name, value) in self.fingerprints.session_headers(&lease.session_id) {
                if !request.has_header(&name) {
                    request.headers.insert(name.clone(), value);
                    injected.push(name);
                }
            }
            request.meta.injected_headers = injected;
        }

        tracing::debug!(
            url = %request.url,
            session = short_id(&lease.session_id),
            requests = lease.requests_count,
            "request proxied"
        );
    }

    /// Classify and record the outcome, then either yield the response or
    /// replay through a different session. Recording is single-shot: a
    /// second call for the same request passes the response through.
    pub fn on_response(
        &self,
        request: &mut ScrapeRequest,
        response: ScrapeResponse,
    ) -> ResponseVerdict {
        if !request.meta.brightdata_enabled {
            return ResponseVerdict::Pass(response);
        }
        request.meta.brightdata_enabled = false;

        let session_id = request.meta.proxy_session_id.clone().unwrap_or_default();
        let response_time = request
            .meta
            .request_start_time
            .map(|start| self.clock.now().duration_since(start).as_secs_f64())
            .unwrap_or(0.0);

        if is_successful_status(response.status) {
            self.tracker.record_success(&session_id, response_time);
            self.sink.inc_value("brightdata/successful_requests");
            tracing::debug!(
                session = short_id(&session_id),
                status = response.status,
                "response fetched through proxy"
            );
            return ResponseVerdict::Pass(response);
        }

        let kind = classify_status(response.status);
        self.record_failure(&session_id, kind);
        tracing::warn!(
            session = short_id(&session_id),
            status = response.status,
            kind = kind.key(),
            "failed response through proxy"
        );

        if should_retry_status(response.status)
            && request.meta.brightdata_retry_count < self.settings.max_retries
        {
            return ResponseVerdict::Retry(self.retry_request(request, &session_id));
        }

        ResponseVerdict::Pass(response)
    }

    /// Record a transport failure; `Some` carries the retry directive,
    /// `None` lets the error propagate to the caller.
    pub fn on_exception(
        &self,
        request: &mut ScrapeRequest,
        error: &TransportError,
    ) -> Option<ScrapeRequest> {
        if !request.meta.brightdata_enabled {
            return None;
        }
        request.meta.brightdata_enabled = false;

        let session_id = request.meta.proxy_session_id.clone().unwrap_or_default();
        let kind = error.kind();
        self.record_failure(&session_id, kind);
        tracing::warn!(
            session = short_id(&session_id),
            error = %error,
            kind = kind.key(),
            "request exception through proxy"
        );

        if error.retryable() && request.meta.brightdata_retry_count < self.settings.max_retries {
            return Some(self.retry_request(request, &session_id));
        }

        None
    }

    /// Aggregate view used for the close-of-run statistics block.
    pub fn stats(&self) -> ProxyStats {
        let (total, successful, failed) = self.tracker.totals();
        let overall_success_rate = if total > 0 {
            let rate = successful as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        ProxyStats {
            enabled: self.enabled,
            active_sessions: self.registry.active_count(),
            total_sessions: self.registry.total_count(),
            blacklisted_sessions: self.registry.blacklisted_count(),
            max_sessions: self.settings.max_sessions,
            rotation_interval: self.settings.rotation_interval,
            requests_since_rotation: self.registry.requests_since_rotation(),
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            overall_success_rate,
            session_details: self.registry.session_details(&self.tracker),
        }
    }

    /// Spider-close hook: log the summary block and mirror every scalar
    /// into the stats sink.
    pub fn close_stats(&self) {
        let stats = self.stats();

        tracing::info!("================ proxy statistics ================");
        tracing::info!(
            total = stats.total_requests,
            successful = stats.successful_requests,
            failed = stats.failed_requests,
            success_rate = %format_args!("{:.2}", stats.overall_success_rate),
            "run totals"
        );
        tracing::info!(
            active = stats.active_sessions,
            blacklisted = stats.blacklisted_sessions,
            "session pool"
        );
        for session in &stats.session_details {
            tracing::info!(
                session = %session.id,
                requests = session.requests,
                success_rate = %format_args!("{:.2}", session.success_rate),
                age_minutes = %format_args!("{:.1}", session.created_minutes_ago),
                "session detail"
            );
        }
        tracing::info!("==================================================");

        stats.mirror_into(self.sink.as_ref());
    }

    fn should_skip(&self, request: &ScrapeRequest) -> bool {
        if request.meta.skip_brightdata_proxy {
            return true;
        }
        let url = request.url.to_lowercase();
        SKIP_URL_PATTERNS.iter().any(|pattern| url.contains(pattern))
    }

    fn record_failure(&self, session_id: &str, kind: FailureKind) {
        let report = self.tracker.record_failure(session_id, kind);
        self.sink
            .inc_value(&format!("brightdata/{}_requests", kind.key()));
        if report.should_blacklist {
            self.registry.blacklist(session_id);
        }
    }

    fn retry_request(&self, request: &ScrapeRequest, offending_session: &str) -> ScrapeRequest {
        let mut retry = request.clone();
        retry.meta.brightdata_retry_count += 1;
        retry.meta.clear_proxy();
        retry.meta.excluded_session = Some(offending_session.to_string());
        for name in std::mem::take(&mut retry.meta.injected_headers) {
            retry.headers.remove(&name);
        }

        tracing::info!(
            url = %request.url,
            attempt = retry.meta.brightdata_retry_count,
            max_retries = self.settings.max_retries,
            "retrying with a different proxy session"
        );

        retry
    }
}
