use std::sync::Arc;
use std::time::Duration;

use proxy_rotator::clock::{Clock, ManualClock};
use proxy_rotator::config::{BrightdataConfig, RotationSettings};
use proxy_rotator::middleware::{
    ProxyMiddleware, ResponseVerdict, ScrapeRequest, ScrapeResponse, TransportError,
};
use proxy_rotator::rotation::RotationStrategy;
use proxy_rotator::stats::MemoryStats;

fn config() -> BrightdataConfig {
    BrightdataConfig::new(
        "brd-customer-abc-zone-residential",
        "secret",
        "brd.superproxy.io",
        33335,
        "residential",
        "DE",
    )
    .unwrap()
}

fn middleware(
    max_sessions: usize,
    max_retries: u32,
) -> (ProxyMiddleware, Arc<ManualClock>, Arc<MemoryStats>) {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemoryStats::new());
    let settings = RotationSettings {
        use_proxies: true,
        max_sessions,
        max_retries,
        strategy: RotationStrategy::RoundRobin,
        ..RotationSettings::default()
    };
    let mw = ProxyMiddleware::new(Some(config()), settings, sink.clone(), clock.clone());
    (mw, clock, sink)
}

#[test]
fn cold_start_stays_unproxied() {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemoryStats::new());
    // USE_PROXIES off is the default.
    let mw = ProxyMiddleware::new(
        Some(config()),
        RotationSettings::default(),
        sink.clone(),
        clock,
    );

    let mut request = ScrapeRequest::new("https://shop.example.com/product/1");
    mw.on_request(&mut request);

    assert!(!mw.is_enabled());
    assert!(request.meta.proxy.is_none());
    assert!(!request.meta.brightdata_enabled);
    assert!(request.headers.is_empty());
    assert_eq!(mw.registry().total_count(), 0);
    assert_eq!(sink.get("brightdata/enabled"), Some(0));
    assert!(!mw.stats().enabled);
}

#[test]
fn happy_path_rotates_across_the_pool() {
    let (mw, clock, _sink) = middleware(3, 3);

    let mut seen_sessions = Vec::new();
    for i in 0..3 {
        let mut request = ScrapeRequest::new(format!("https://shop.example.com/product/{i}"));
        mw.on_request(&mut request);

        let session_id = request.meta.proxy_session_id.clone().unwrap();
        let proxy = request.meta.proxy.clone().unwrap();
        assert!(proxy.starts_with("http://"));
        assert!(proxy.contains(&format!("-session-{session_id}")));
        assert_eq!(request.meta.proxy_created_at, Some(clock.unix_millis()));
        assert_eq!(request.meta.proxy_requests_count, Some(1));
        assert!(request.meta.brightdata_enabled);
        assert!(request.meta.request_start_time.is_some());
        assert_eq!(request.meta.brightdata_retry_count, 0);
        seen_sessions.push(session_id);

        let response = ScrapeResponse::new(request.url.clone(), 200);
        match mw.on_response(&mut request, response) {
            ResponseVerdict::Pass(response) => assert_eq!(response.status, 200),
            ResponseVerdict::Retry(_) => panic!("successful response must pass through"),
        }
    }

    seen_sessions.sort();
    seen_sessions.dedup();
    assert_eq!(seen_sessions.len(), 3);

    let stats = mw.stats();
    assert!(stats.enabled);
    assert_eq!(stats.active_sessions, 3);
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.successful_requests, 3);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.overall_success_rate, 100.0);
    assert_eq!(stats.session_details.len(), 3);
    for detail in &stats.session_details {
        assert_eq!(detail.requests, 1);
        assert_eq!(detail.success_rate, 100.0);
    }
}

#[test]
fn blocked_response_retries_on_a_fresh_session() {
    let (mw, _clock, _sink) = middleware(2, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/7");
    mw.on_request(&mut request);
    let failing_session = request.meta.proxy_session_id.clone().unwrap();

    let response = ScrapeResponse::new(request.url.clone(), 403);
    let ResponseVerdict::Retry(mut retry) = mw.on_response(&mut request, response) else {
        panic!("403 under the retry budget must produce a retry directive");
    };

    assert_eq!(retry.meta.brightdata_retry_count, 1);
    assert!(retry.meta.proxy.is_none());
    assert!(retry.meta.proxy_session_id.is_none());
    assert!(retry.meta.proxy_created_at.is_none());
    assert!(retry.meta.proxy_requests_count.is_none());
    assert!(!retry.meta.brightdata_enabled);

    // The failure is recorded but one blocked response is not enough for
    // the blacklist.
    let metrics = mw.tracker().snapshot(&failing_session).unwrap();
    assert_eq!(metrics.blocked_requests, 1);
    assert!(!mw.registry().is_blacklisted(&failing_session));

    mw.on_request(&mut retry);
    let second_session = retry.meta.proxy_session_id.clone().unwrap();
    assert_ne!(second_session, failing_session);
}

#[test]
fn retry_never_reuses_the_only_offending_session() {
    let (mw, _clock, _sink) = middleware(1, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/9");
    mw.on_request(&mut request);
    let offending = request.meta.proxy_session_id.clone().unwrap();

    let response = ScrapeResponse::new(request.url.clone(), 429);
    let ResponseVerdict::Retry(mut retry) = mw.on_response(&mut request, response) else {
        panic!("429 under the retry budget must produce a retry directive");
    };

    // Pool of one, and that one just failed: the retry goes out unproxied
    // rather than back through the same session.
    mw.on_request(&mut retry);
    assert!(retry.meta.proxy.is_none());
    assert_ne!(retry.meta.proxy_session_id.as_deref(), Some(offending.as_str()));
}

#[test]
fn sustained_failures_blacklist_the_session() {
    let (mw, clock, _sink) = middleware(1, 3);

    let mut first_session = None;
    for i in 0..11 {
        let mut request = ScrapeRequest::new(format!("https://shop.example.com/product/{i}"));
        mw.on_request(&mut request);
        let session_id = request.meta.proxy_session_id.clone().unwrap();
        match &first_session {
            None => first_session = Some(session_id.clone()),
            Some(expected) => assert_eq!(&session_id, expected),
        }

        // 500 is recorded as a server error but is not a retry status.
        let response = ScrapeResponse::new(request.url.clone(), 500);
        match mw.on_response(&mut request, response) {
            ResponseVerdict::Pass(response) => assert_eq!(response.status, 500),
            ResponseVerdict::Retry(_) => panic!("500 is not a retry status"),
        }
    }

    let failed = first_session.unwrap();
    assert!(mw.registry().is_blacklisted(&failed));
    assert!(!mw.registry().contains(&failed));

    // Replacement session gets a fresh id.
    let mut request = ScrapeRequest::new("https://shop.example.com/product/12");
    mw.on_request(&mut request);
    let replacement = request.meta.proxy_session_id.clone().unwrap();
    assert_ne!(replacement, failed);

    // The old id stays barred until the blacklist TTL lapses.
    clock.advance(Duration::from_secs(29 * 60));
    mw.registry().cleanup_expired();
    assert!(mw.registry().is_blacklisted(&failed));

    clock.advance(Duration::from_secs(2 * 60));
    mw.registry().cleanup_expired();
    assert!(!mw.registry().is_blacklisted(&failed));
}

#[test]
fn timeouts_retry_until_the_budget_is_spent() {
    let (mw, _clock, _sink) = middleware(3, 2);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/3");

    mw.on_request(&mut request);
    let retry = mw.on_exception(&mut request, &TransportError::Timeout);
    let mut request = retry.expect("first timeout is retried");
    assert_eq!(request.meta.brightdata_retry_count, 1);

    mw.on_request(&mut request);
    let retry = mw.on_exception(&mut request, &TransportError::Timeout);
    let mut request = retry.expect("second timeout is retried");
    assert_eq!(request.meta.brightdata_retry_count, 2);

    mw.on_request(&mut request);
    let retry = mw.on_exception(&mut request, &TransportError::Timeout);
    assert!(retry.is_none(), "budget of 2 is spent, error propagates");

    let (total, successful, failed) = mw.tracker().totals();
    assert_eq!((total, successful, failed), (3, 0, 3));
}

#[test]
fn connection_errors_are_retryable_but_unknown_errors_are_not() {
    let (mw, _clock, _sink) = middleware(2, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/4");
    mw.on_request(&mut request);
    let retry = mw.on_exception(&mut request, &TransportError::ConnectionRefused);
    assert!(retry.is_some());

    let mut request = ScrapeRequest::new("https://shop.example.com/product/5");
    mw.on_request(&mut request);
    let retry = mw.on_exception(
        &mut request,
        &TransportError::Other("tls handshake exploded".to_string()),
    );
    assert!(retry.is_none());
}

#[test]
fn skip_rules_bypass_the_pool() {
    let (mw, _clock, _sink) = middleware(3, 3);

    for url in [
        "https://shop.example.com/robots.txt",
        "https://shop.example.com/favicon.ico",
        "https://shop.example.com/sitemap.xml",
    ] {
        let mut request = ScrapeRequest::new(url);
        mw.on_request(&mut request);
        assert!(request.meta.proxy.is_none(), "{url} must stay unproxied");
    }

    let mut request = ScrapeRequest::new("https://shop.example.com/product/1").skip_proxy();
    mw.on_request(&mut request);
    assert!(request.meta.proxy.is_none());

    // A manual proxy override is left alone.
    let mut request = ScrapeRequest::new("https://shop.example.com/product/2");
    request.meta.proxy = Some("http://user:pw@other-proxy:8080".to_string());
    mw.on_request(&mut request);
    assert_eq!(
        request.meta.proxy.as_deref(),
        Some("http://user:pw@other-proxy:8080")
    );
    assert!(!request.meta.brightdata_enabled);
}

#[test]
fn on_response_records_exactly_once() {
    let (mw, _clock, _sink) = middleware(1, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/1");
    mw.on_request(&mut request);

    let response = ScrapeResponse::new(request.url.clone(), 200);
    match mw.on_response(&mut request, response) {
        ResponseVerdict::Pass(_) => {}
        ResponseVerdict::Retry(_) => panic!("success must pass"),
    }

    // A duplicate delivery for the same request is a pass-through no-op.
    let duplicate = ScrapeResponse::new(request.url.clone(), 200);
    match mw.on_response(&mut request, duplicate) {
        ResponseVerdict::Pass(_) => {}
        ResponseVerdict::Retry(_) => panic!("duplicate must pass"),
    }

    let (total, successful, _failed) = mw.tracker().totals();
    assert_eq!((total, successful), (1, 1));
}

#[test]
fn unproxied_responses_pass_through_untouched() {
    let (mw, _clock, _sink) = middleware(2, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/robots.txt");
    mw.on_request(&mut request);
    let response = ScrapeResponse::new(request.url.clone(), 503);
    match mw.on_response(&mut request, response) {
        ResponseVerdict::Pass(response) => assert_eq!(response.status, 503),
        ResponseVerdict::Retry(_) => panic!("unproxied responses are never retried"),
    }

    let (total, _successful, _failed) = mw.tracker().totals();
    assert_eq!(total, 0);
}

#[test]
fn response_times_feed_the_health_window() {
    let (mw, clock, _sink) = middleware(1, 3);

    let mut request = ScrapeRequest::new("https://shop.example.com/product/1");
    mw.on_request(&mut request);
    let session_id = request.meta.proxy_session_id.clone().unwrap();

    clock.advance(Duration::from_millis(500));
    let response = ScrapeResponse::new(request.url.clone(), 200);
    mw.on_response(&mut request, response);

    let metrics = mw.tracker().snapshot(&session_id).unwrap();
    assert_eq!(metrics.sample_count(), 1);
    assert!((metrics.average_response_time - 0.5).abs() < 1e-9);
}

#[test]
fn close_stats_mirrors_scalars_into_the_sink() {
    let (mw, _clock, sink) = middleware(2, 3);

    for i in 0..2 {
        let mut request = ScrapeRequest::new(format!("https://shop.example.com/product/{i}"));
        mw.on_request(&mut request);
        let status = if i == 0 { 200 } else { 500 };
        let response = ScrapeResponse::new(request.url.clone(), status);
        mw.on_response(&mut request, response);
    }

    mw.close_stats();

    assert_eq!(sink.get("brightdata/enabled"), Some(1));
    assert_eq!(sink.get("brightdata/total_requests"), Some(2));
    assert_eq!(sink.get("brightdata/successful_requests"), Some(1));
    assert_eq!(sink.get("brightdata/failed_requests"), Some(1));
    assert_eq!(sink.get("brightdata/active_sessions"), Some(2));
    assert_eq!(sink.get("brightdata/overall_success_rate"), Some(50));
    // Per-kind counter incremented as the failure was recorded.
    assert_eq!(sink.get("brightdata/server_error_requests"), Some(1));
}
