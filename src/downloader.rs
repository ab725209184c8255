use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use dashmap::DashMap;
use reqwest::Client;

use crate::middleware::{
    ProxyMiddleware, ResponseVerdict, ScrapeRequest, ScrapeResponse, TransportError,
};

const DIRECT_CLIENT_KEY: &str = "direct";

/// Thin adapter that drives a request through the middleware hooks with a
/// real HTTP client. The host pipeline usually brings its own downloader;
/// this covers standalone use and smoke runs.
pub struct ProxiedFetcher {
    middleware: Arc<ProxyMiddleware>,
    timeout: Duration,
    // One client per session: the proxy credential is baked into the
    // client, and sessions turn over, so clients follow the pool.
    clients: DashMap<String, Client>,
}

impl ProxiedFetcher {
    pub fn new(middleware: Arc<ProxyMiddleware>) -> Self {
        let timeout = Duration::from_secs(middleware.settings().timeout_secs);
        Self {
            middleware,
            timeout,
            clients: DashMap::new(),
        }
    }

    /// Fetch the URL, rotating sessions on proxy-attributable failures
    /// until the middleware stops issuing retry directives.
    pub async fn fetch(&self, url: &str) -> Result<ScrapeResponse> {
        let mut request = ScrapeRequest::new(url);
        loop {
            self.middleware.on_request(&mut request);
            match self.send(&request).await {
                Ok(response) => match self.middleware.on_response(&mut request, response) {
                    ResponseVerdict::Pass(response) => return Ok(response),
                    ResponseVerdict::Retry(next) => request = next,
                },
                Err(transport) => match self.middleware.on_exception(&mut request, &transport) {
                    Some(next) => request = next,
                    None => bail!("request to {url} failed: {transport}"),
                },
            }
        }
    }

    async fn send(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError> {
        let client = self
            .client_for(request)
            .map_err(|err| TransportError::from(&err))?;

        let mut builder = client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => Ok(ScrapeResponse::new(
                response.url().to_string(),
                response.status().as_u16(),
            )),
            Ok(Err(err)) => Err(TransportError::from(&err)),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn client_for(&self, request: &ScrapeRequest) -> Result<Client, reqwest::Error> {
        let key = request
            .meta
            .proxy_session_id
            .clone()
            .unwrap_or_else(|| DIRECT_CLIENT_KEY.to_string());

        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(proxy_url) = &request.meta.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        let client = builder.build()?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}
