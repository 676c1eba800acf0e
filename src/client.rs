use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{HOST, USER_AGENT};
use tracing::{debug, info_span, warn};

use crate::config::{ClientConfig, TransportOptions};
use crate::error::Error;
use crate::execution::ExecutionState;
use crate::extensions::{Sleeper, ThreadSleeper};
use crate::guard::{Resolver, resolve_target};
use crate::redirect::{RedirectPolicy, RedirectStep, next_redirect_step};
use crate::request::{Method, RequestBuilder, RequestSpec};
use crate::resolver::SystemResolver;
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::transport::{BlockingTransport, Transport, TransportRequest};
use crate::util::{join_base_path, looks_absolute, redact_uri_for_logs, validate_request_url};

pub struct HttpClientBuilder {
    config: crate::Result<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
    resolver: Option<Arc<dyn Resolver>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            config: Ok(ClientConfig::default()),
            transport: None,
            resolver: None,
            sleeper: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Ok(config);
        self
    }

    pub fn timeout_secs(mut self, seconds: f64) -> Self {
        self.config = self
            .config
            .and_then(|config| config.with_timeout_secs(seconds));
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config = self
            .config
            .map(|config| config.with_max_redirects(max_redirects));
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.config = self
            .config
            .map(|config| config.with_max_retries(max_retries));
        self
    }

    pub fn strict_redirects(mut self, strict_redirects: bool) -> Self {
        self.config = self
            .config
            .map(|config| config.with_strict_redirects(strict_redirects));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        self.config = self
            .config
            .map(|config| config.with_user_agent(user_agent));
        self
    }

    pub fn base_uri(mut self, base_uri: &str) -> Self {
        self.config = self.config.and_then(|config| config.with_base_uri(base_uri));
        self
    }

    pub fn trust_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config = self.config.and_then(|config| config.trust_hosts(hosts));
        self
    }

    pub fn transport_options(mut self, transport_options: TransportOptions) -> Self {
        self.config = self
            .config
            .map(|config| config.with_transport_options(transport_options));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Fails with the first configuration error recorded by a setter.
    pub fn try_build(self) -> crate::Result<HttpClient> {
        let config = self.config?;
        Ok(HttpClient {
            config: Arc::new(config),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(BlockingTransport::new())),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(SystemResolver::default())),
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(ThreadSleeper)),
        })
    }
}

/// SSRF-safe blocking client. Cloning is cheap and clones share
/// configuration and collaborators; every call keeps its own
/// [`ExecutionState`].
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolver>,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_config(ClientConfig::default())
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with the default transport, resolver and sleeper.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(BlockingTransport::new()),
            resolver: Arc::new(SystemResolver::default()),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Get, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Put, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Patch, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Delete, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Head, url)
    }

    pub fn options(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Options, url)
    }

    pub fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        headers: HeaderMap,
    ) -> crate::Result<Response> {
        let mut spec = RequestSpec::new(method, url).with_headers(headers);
        if let Some(body) = body {
            spec = spec.with_body(body);
        }
        self.send(spec)
    }

    pub fn send(&self, spec: RequestSpec) -> crate::Result<Response> {
        self.send_with_state(spec).map(|(response, _)| response)
    }

    /// Like [`HttpClient::send`], also returning how many redirects and
    /// retries the call went through.
    pub fn send_with_state(
        &self,
        spec: RequestSpec,
    ) -> crate::Result<(Response, ExecutionState)> {
        let mut spec = match self.config.base_uri() {
            Some(base_uri) if !looks_absolute(spec.url()) => {
                let url = join_base_path(base_uri, spec.url());
                spec.with_url(url)
            }
            _ => spec,
        };

        let span = info_span!(
            "safereq.request",
            method = %spec.method(),
            uri = %redact_uri_for_logs(spec.url())
        );
        let _enter = span.enter();

        let timeout = self.config.timeout();
        let redirect_policy = RedirectPolicy::from_config(&self.config);
        let retry_policy = RetryPolicy::limited(self.config.max_retries());
        let mut state = ExecutionState::default();

        loop {
            let response = self.send_hop(&spec, timeout, retry_policy, &mut state)?;
            match next_redirect_step(redirect_policy, state.redirects_followed, &spec, response) {
                RedirectStep::Follow(next) => {
                    state.redirects_followed += 1;
                    spec = next;
                }
                RedirectStep::Terminate(response) => return Ok((response, state)),
            }
        }
    }

    /// Validates, guards and sends one hop, retrying transport failures.
    fn send_hop(
        &self,
        spec: &RequestSpec,
        timeout: Option<Duration>,
        retry_policy: RetryPolicy,
        state: &mut ExecutionState,
    ) -> crate::Result<Response> {
        let parsed = validate_request_url(spec.url())?;
        let Some(host) = parsed.host_str() else {
            return Err(Error::invalid_url(spec.url(), "url has no host"));
        };
        let target = resolve_target(spec.url(), host, &self.config, self.resolver.as_ref())?;

        let host_header = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        let header_lines =
            outbound_header_lines(spec.headers(), &host_header, self.config.user_agent());
        let request = TransportRequest {
            method: spec.method(),
            url: &target,
            tls_host: host,
            headers: &header_lines,
            body: spec.body(),
            timeout,
            options: self.config.transport_options(),
        };

        let mut retries = 0;
        loop {
            debug!(
                redirects_followed = state.redirects_followed,
                attempt = retries + 1,
                "sending request"
            );
            let failure = match self.transport.fetch(&request) {
                Ok(raw) => return Response::parse(&raw.header_lines, raw.body),
                Err(failure) => failure,
            };

            if !retry_policy.allows_retry(retries) {
                return Err(Error::RequestFailed {
                    method: spec.method(),
                    url: spec.url().to_owned(),
                    retries,
                    redirects_followed: state.redirects_followed,
                    source: failure,
                });
            }

            retries += 1;
            state.retries_attempted += 1;
            let delay = retry_policy.backoff_for_retry(retries);
            warn!(
                delay_ms = delay.as_millis() as u64,
                retry = retries,
                error = %failure,
                "retrying request after transport failure"
            );
            self.sleeper.sleep(delay);
        }
    }
}

/// Builds `name: value` lines from caller headers. Names are lower-cased and
/// unique, keeping the first position and the last value; `host` and
/// `user-agent` are always ours.
fn outbound_header_lines(headers: &HeaderMap, host: &str, user_agent: &str) -> Vec<String> {
    let mut lines = Vec::with_capacity(headers.keys_len() + 2);
    let mut saw_host = false;
    let mut saw_user_agent = false;

    for name in headers.keys() {
        let value = if *name == HOST {
            saw_host = true;
            host.to_owned()
        } else if *name == USER_AGENT {
            saw_user_agent = true;
            user_agent.to_owned()
        } else {
            match headers.get_all(name).iter().last() {
                Some(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
                None => continue,
            }
        };
        lines.push(format!("{}: {}", name.as_str(), value));
    }

    if !saw_host {
        lines.push(format!("host: {host}"));
    }
    if !saw_user_agent {
        lines.push(format!("user-agent: {user_agent}"));
    }
    lines
}
