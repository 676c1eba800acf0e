use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use safereq::{
    ClientConfig, Error, ErrorCode, HttpClient, Method, RawResponse, RequestSpec, ResolutionError,
    Resolver, Sleeper, Transport, TransportErrorKind, TransportFailure, TransportRequest,
};
use serde_json::Value;

const EXAMPLE_IP: &str = "93.184.216.34";

enum Step {
    Respond(Vec<String>, Bytes),
    Fail(TransportErrorKind),
}

fn respond(lines: &[&str]) -> Step {
    Step::Respond(
        lines.iter().map(|line| (*line).to_owned()).collect(),
        Bytes::new(),
    )
}

fn respond_with_body(lines: &[&str], body: &'static str) -> Step {
    Step::Respond(
        lines.iter().map(|line| (*line).to_owned()).collect(),
        Bytes::from_static(body.as_bytes()),
    )
}

#[derive(Clone, Debug)]
struct SeenRequest {
    method: Method,
    url: String,
    tls_host: String,
    headers: Vec<String>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl SeenRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (candidate, value) = line.split_once(':')?;
            candidate
                .trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Step>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into())),
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("lock seen requests").clone()
    }

    fn calls(&self) -> usize {
        self.seen.lock().expect("lock seen requests").len()
    }
}

impl Transport for ScriptedTransport {
    fn fetch(&self, request: &TransportRequest<'_>) -> Result<RawResponse, TransportFailure> {
        self.seen
            .lock()
            .expect("lock seen requests")
            .push(SeenRequest {
                method: request.method,
                url: request.url.to_owned(),
                tls_host: request.tls_host.to_owned(),
                headers: request.headers.to_vec(),
                body: request.body.cloned(),
                timeout: request.timeout,
            });
        let step = self
            .script
            .lock()
            .expect("lock script")
            .pop_front()
            .expect("transport called more often than scripted");
        match step {
            Step::Respond(header_lines, body) => Ok(RawResponse { header_lines, body }),
            Step::Fail(kind) => Err(TransportFailure::new(kind, "scripted failure")),
        }
    }
}

#[derive(Clone, Default)]
struct MapResolver {
    answers: Arc<BTreeMap<String, IpAddr>>,
    calls: Arc<AtomicUsize>,
}

impl MapResolver {
    fn new(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: Arc::new(
                answers
                    .iter()
                    .map(|(host, ip)| ((*host).to_owned(), ip.parse().expect("test ip")))
                    .collect(),
            ),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for MapResolver {
    fn resolve_to_ip(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(host)
            .copied()
            .ok_or_else(|| ResolutionError::DisallowedHost {
                host: host.to_owned(),
            })
    }
}

#[derive(Clone, Default)]
struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("lock delays").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("lock delays").push(duration);
    }
}

struct Harness {
    client: HttpClient,
    transport: ScriptedTransport,
    resolver: MapResolver,
    sleeper: RecordingSleeper,
}

fn harness(config: ClientConfig, steps: Vec<Step>) -> Harness {
    let transport = ScriptedTransport::new(steps);
    let resolver = MapResolver::new(&[("example.com", EXAMPLE_IP), ("other.example", "203.0.113.9")]);
    let sleeper = RecordingSleeper::default();
    let client = HttpClient::builder()
        .config(config)
        .transport(transport.clone())
        .resolver(resolver.clone())
        .sleeper(sleeper.clone())
        .try_build()
        .expect("client should build");
    Harness {
        client,
        transport,
        resolver,
        sleeper,
    }
}

fn get(client: &HttpClient, url: &str) -> safereq::Result<safereq::Response> {
    client.execute(Method::Get, url, None, HeaderMap::new())
}

fn post(client: &HttpClient, url: &str, body: &'static str) -> safereq::Result<safereq::Response> {
    client.execute(
        Method::Post,
        url,
        Some(Bytes::from_static(body.as_bytes())),
        HeaderMap::new(),
    )
}

#[test]
fn trusted_hosts_and_ip_literals_never_reach_the_resolver() {
    let config = ClientConfig::default()
        .trust_hosts(["API.Internal"])
        .expect("trusted host");
    let h = harness(
        config,
        vec![
            respond(&["HTTP/1.1 200 OK"]),
            respond(&["HTTP/1.1 200 OK"]),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );

    get(&h.client, "https://api.internal/status").expect("trusted host call");
    get(&h.client, "http://10.1.2.3:8080/status").expect("ipv4 literal call");
    get(&h.client, "http://[2001:db8::7]/status").expect("ipv6 literal call");

    assert_eq!(h.resolver.calls(), 0);
    let seen = h.transport.seen();
    assert_eq!(seen[0].url, "https://api.internal/status");
    assert_eq!(seen[1].url, "http://10.1.2.3:8080/status");
    assert_eq!(seen[1].header("host"), Some("10.1.2.3:8080"));
    assert_eq!(seen[2].url, "http://[2001:db8::7]/status");
}

#[test]
fn resolved_host_is_rewritten_while_host_header_keeps_the_name() {
    let h = harness(
        ClientConfig::default().with_user_agent("engine-test/1.0"),
        vec![respond_with_body(
            &["HTTP/1.1 200 OK", "Content-Type: application/json"],
            r#"{"ok":true}"#,
        )],
    );

    let mut headers = HeaderMap::new();
    headers.insert("user-agent", "spoofed".parse().expect("header value"));
    headers.insert("x-request-id", "abc-123".parse().expect("header value"));
    let response = h
        .client
        .execute(
            Method::Get,
            "https://example.com:8443/v1/items?limit=5#top",
            None,
            headers,
        )
        .expect("call should succeed");

    let body: Value = response.json().expect("json body");
    assert_eq!(body["ok"], true);
    assert_eq!(h.resolver.calls(), 1);

    let seen = h.transport.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "https://93.184.216.34:8443/v1/items?limit=5#top");
    assert_eq!(seen[0].tls_host, "example.com");
    assert_eq!(seen[0].header("host"), Some("example.com:8443"));
    assert_eq!(seen[0].header("user-agent"), Some("engine-test/1.0"));
    assert_eq!(seen[0].header("x-request-id"), Some("abc-123"));
}

#[test]
fn rejected_host_fails_before_any_connection() {
    let h = harness(ClientConfig::default(), Vec::new());

    let error = get(&h.client, "https://metadata.internal/latest").expect_err("must be refused");
    assert_eq!(error.code(), ErrorCode::TargetResolution);
    match error {
        Error::TargetResolution { host, source } => {
            assert_eq!(host, "metadata.internal");
            assert!(matches!(source, ResolutionError::DisallowedHost { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.transport.calls(), 0);
}

#[test]
fn invalid_urls_are_rejected_without_side_effects() {
    let h = harness(ClientConfig::default(), Vec::new());
    for url in [
        "ftp://example.com/file",
        "https://",
        "example.com/path",
        " https://example.com",
        "https://example.com/with space",
    ] {
        let error = get(&h.client, url).expect_err("invalid url");
        assert_eq!(error.code(), ErrorCode::InvalidUrl, "{url}");
    }
    assert_eq!(h.transport.calls(), 0);
    assert_eq!(h.resolver.calls(), 0);
}

#[test]
fn unsendable_redirect_target_fails_without_retrying() {
    let h = harness(
        ClientConfig::default().with_max_retries(3),
        vec![respond(&["HTTP/1.1 302 Found", "Location: /next page"])],
    );

    let error = get(&h.client, "https://example.com/start").expect_err("target is unsendable");
    match error {
        Error::InvalidUrl { url, .. } => assert_eq!(url, "https://example.com/next page"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.transport.calls(), 1);
    assert!(h.sleeper.delays().is_empty());
}

#[test]
fn see_other_turns_post_into_bodiless_get() {
    let h = harness(
        ClientConfig::default(),
        vec![
            respond(&["HTTP/1.1 303 See Other", "Location: /done"]),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );

    let response = post(&h.client, "https://example.com/form", "a=1").expect("call should succeed");
    assert_eq!(response.status_code(), 200);

    let seen = h.transport.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, Method::Post);
    assert_eq!(seen[0].body, Some(Bytes::from_static(b"a=1")));
    assert_eq!(seen[1].method, Method::Get);
    assert_eq!(seen[1].body, None);
    assert_eq!(seen[1].url, "https://93.184.216.34/done");
    assert_eq!(seen[1].header("host"), Some("example.com"));
}

#[test]
fn found_downgrades_post_unless_strict() {
    let lenient = harness(
        ClientConfig::default(),
        vec![
            respond(&["HTTP/1.1 302 Found", "Location: https://other.example/next"]),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );
    post(&lenient.client, "https://example.com/form", "a=1").expect("lenient call");
    let seen = lenient.transport.seen();
    assert_eq!(seen[1].method, Method::Get);
    assert_eq!(seen[1].body, None);
    assert_eq!(seen[1].url, "https://203.0.113.9/next");
    assert_eq!(seen[1].tls_host, "other.example");

    let strict = harness(
        ClientConfig::default().with_strict_redirects(true),
        vec![
            respond(&["HTTP/1.1 302 Found", "Location: /again"]),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );
    post(&strict.client, "https://example.com/form", "a=1").expect("strict call");
    let seen = strict.transport.seen();
    assert_eq!(seen[1].method, Method::Post);
    assert_eq!(seen[1].body, Some(Bytes::from_static(b"a=1")));
    assert_eq!(seen[1].url, "https://93.184.216.34/again");
}

#[test]
fn zero_max_redirects_returns_the_redirect_response() {
    let h = harness(
        ClientConfig::default().with_max_redirects(0),
        vec![respond(&["HTTP/1.1 302 Found", "Location: /elsewhere"])],
    );

    let response = get(&h.client, "https://example.com/").expect("call should succeed");
    assert_eq!(response.status_code(), 302);
    assert_eq!(response.location(), Some("/elsewhere"));
    assert_eq!(h.transport.calls(), 1);
}

#[test]
fn redirect_budget_stops_after_max_hops() {
    let h = harness(
        ClientConfig::default().with_max_redirects(2),
        vec![
            respond(&["HTTP/1.1 301 Moved Permanently", "Location: /one"]),
            respond(&["HTTP/1.1 301 Moved Permanently", "Location: /two"]),
            respond(&["HTTP/1.1 301 Moved Permanently", "Location: /three"]),
        ],
    );

    let (response, state) = h
        .client
        .send_with_state(RequestSpec::new(Method::Get, "https://example.com/start"))
        .expect("call should succeed");
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.location(), Some("/three"));
    assert_eq!(state.redirects_followed(), 2);
    assert_eq!(h.transport.calls(), 3);

    let urls: Vec<String> = h.transport.seen().into_iter().map(|seen| seen.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://93.184.216.34/start",
            "https://93.184.216.34/one",
            "https://93.184.216.34/two",
        ]
    );
}

#[test]
fn caller_headers_are_carried_across_redirects() {
    let h = harness(
        ClientConfig::default(),
        vec![
            respond(&["HTTP/1.1 307 Temporary Redirect", "Location: https://other.example/b"]),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );

    h.client
        .get("https://example.com/a")
        .try_header("x-trace", "t-1")
        .expect("valid header")
        .send()
        .expect("call should succeed");

    let seen = h.transport.seen();
    assert_eq!(seen[0].header("x-trace"), Some("t-1"));
    assert_eq!(seen[1].header("x-trace"), Some("t-1"));
    assert_eq!(seen[1].header("host"), Some("other.example"));
}

#[test]
fn redirect_to_rejected_host_fails_with_target_resolution() {
    let h = harness(
        ClientConfig::default(),
        vec![respond(&["HTTP/1.1 302 Found", "Location: http://169.254.169.254.nip.test/"])],
    );

    let error = get(&h.client, "https://example.com/").expect_err("redirect must be refused");
    assert_eq!(error.code(), ErrorCode::TargetResolution);
    assert_eq!(h.transport.calls(), 1);
}

#[test]
fn retry_recovers_after_two_transport_failures() {
    let h = harness(
        ClientConfig::default().with_max_retries(2),
        vec![
            Step::Fail(TransportErrorKind::Connect),
            Step::Fail(TransportErrorKind::Timeout),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );

    let (response, state) = h
        .client
        .send_with_state(RequestSpec::new(Method::Get, "https://example.com/flaky"))
        .expect("call should recover");
    assert_eq!(response.status_code(), 200);
    assert_eq!(state.retries_attempted(), 2);
    assert_eq!(h.transport.calls(), 3);

    let delays = h.sleeper.delays();
    assert_eq!(delays.len(), 2);
    for (index, delay) in delays.iter().enumerate() {
        let attempt = index as u32 + 1;
        let floor = Duration::from_secs(1_u64 << attempt);
        assert!(*delay >= floor, "retry {attempt}: {delay:?} < {floor:?}");
        assert!(*delay <= floor + Duration::from_secs(1), "retry {attempt}: {delay:?}");
        assert!(*delay <= Duration::from_secs(65));
    }
}

#[test]
fn exhausted_retries_report_request_failed() {
    let h = harness(
        ClientConfig::default().with_max_retries(1),
        vec![
            Step::Fail(TransportErrorKind::Connect),
            Step::Fail(TransportErrorKind::Connect),
        ],
    );

    let error = get(&h.client, "https://example.com/down").expect_err("call must fail");
    match error {
        Error::RequestFailed {
            method,
            url,
            retries,
            redirects_followed,
            source,
        } => {
            assert_eq!(method, Method::Get);
            assert_eq!(url, "https://example.com/down");
            assert_eq!(retries, 1);
            assert_eq!(redirects_followed, 0);
            assert_eq!(source.kind(), TransportErrorKind::Connect);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.sleeper.delays().len(), 1);
}

#[test]
fn default_config_makes_a_single_attempt() {
    let h = harness(
        ClientConfig::default(),
        vec![Step::Fail(TransportErrorKind::Read)],
    );

    let error = get(&h.client, "https://example.com/").expect_err("call must fail");
    assert_eq!(error.code(), ErrorCode::RequestFailed);
    assert_eq!(h.transport.calls(), 1);
    assert!(h.sleeper.delays().is_empty());
}

#[test]
fn error_statuses_are_responses_not_retries() {
    let h = harness(
        ClientConfig::default().with_max_retries(3),
        vec![respond_with_body(
            &["HTTP/1.1 503 Service Unavailable", "Retry-After: 1"],
            "busy",
        )],
    );

    let response = get(&h.client, "https://example.com/").expect("status is not a failure");
    assert_eq!(response.status_code(), 503);
    assert_eq!(response.reason_phrase(), "Service Unavailable");
    assert_eq!(response.text_lossy(), "busy");
    assert_eq!(response.header("retry-after"), Some("1"));
    assert_eq!(response.into_body(), Bytes::from_static(b"busy"));
    assert_eq!(h.transport.calls(), 1);
    assert!(h.sleeper.delays().is_empty());
}

#[test]
fn malformed_status_line_is_not_retried() {
    let h = harness(
        ClientConfig::default().with_max_retries(2),
        vec![respond(&["ICY 200 OK", "Content-Type: audio/mpeg"])],
    );

    let error = get(&h.client, "https://example.com/stream").expect_err("must be malformed");
    assert_eq!(error.code(), ErrorCode::MalformedStatusLine);
    assert_eq!(h.transport.calls(), 1);
}

#[test]
fn failure_mid_chain_reports_hops_already_followed() {
    let h = harness(
        ClientConfig::default(),
        vec![
            respond(&["HTTP/1.1 301 Moved Permanently", "Location: /next"]),
            Step::Fail(TransportErrorKind::Connect),
        ],
    );

    let error = get(&h.client, "https://example.com/first").expect_err("second hop fails");
    match error {
        Error::RequestFailed {
            url,
            redirects_followed,
            retries,
            ..
        } => {
            assert_eq!(url, "https://example.com/next");
            assert_eq!(redirects_followed, 1);
            assert_eq!(retries, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn base_uri_is_joined_for_relative_urls_only() {
    let config = ClientConfig::default()
        .with_base_uri("https://example.com/api/")
        .expect("base uri");
    let h = harness(
        config,
        vec![respond(&["HTTP/1.1 200 OK"]), respond(&["HTTP/1.1 200 OK"])],
    );

    get(&h.client, "/users").expect("relative call");
    get(&h.client, "https://other.example/x").expect("absolute call");

    let seen = h.transport.seen();
    assert_eq!(seen[0].url, "https://93.184.216.34/api/users");
    assert_eq!(seen[1].url, "https://203.0.113.9/x");
}

#[test]
fn timeout_is_handed_to_the_transport() {
    let h = harness(
        ClientConfig::default()
            .with_timeout_secs(2.5)
            .expect("timeout"),
        vec![respond(&["HTTP/1.1 204 No Content"])],
    );
    get(&h.client, "https://example.com/").expect("call should succeed");
    assert_eq!(h.transport.seen()[0].timeout, Some(Duration::from_millis(2_500)));

    let infinite = harness(
        ClientConfig::default()
            .with_timeout_secs(-1.0)
            .expect("timeout"),
        vec![respond(&["HTTP/1.1 204 No Content"])],
    );
    get(&infinite.client, "https://example.com/").expect("call should succeed");
    assert_eq!(infinite.transport.seen()[0].timeout, None);
}

#[test]
fn builder_bodies_set_default_content_types() {
    let h = harness(
        ClientConfig::default(),
        vec![
            respond(&["HTTP/1.1 201 Created"]),
            respond_with_body(&["HTTP/1.1 200 OK"], r#"{"id":9}"#),
            respond(&["HTTP/1.1 200 OK"]),
        ],
    );

    h.client
        .post("https://example.com/form")
        .form([("name", "Jane Doe"), ("lang", "rust")])
        .send()
        .expect("form call");
    let created: Value = h
        .client
        .put("https://example.com/items/9")
        .json(&serde_json::json!({ "name": "demo" }))
        .expect("json body")
        .send_json()
        .expect("json call");
    assert_eq!(created["id"], 9);
    h.client
        .get("https://example.com/search")
        .query_pair("q", "ssrf guard")
        .query_pairs([("page", "2")])
        .send()
        .expect("query call");

    let seen = h.transport.seen();
    assert_eq!(
        seen[0].header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(seen[0].body, Some(Bytes::from_static(b"name=Jane+Doe&lang=rust")));
    assert_eq!(seen[1].method, Method::Put);
    assert_eq!(seen[1].header("content-type"), Some("application/json"));
    assert_eq!(seen[1].body, Some(Bytes::from_static(br#"{"name":"demo"}"#)));
    assert_eq!(seen[2].url, "https://93.184.216.34/search?q=ssrf+guard&page=2");
    assert_eq!(seen[2].header("content-type"), None);
}

#[test]
fn client_built_from_deserialized_config() {
    let config: ClientConfig = serde_json::from_str(
        r#"{ "max_redirects": 0, "max_retries": 1, "user_agent": "from-json/2" }"#,
    )
    .expect("config should deserialize");
    let h = harness(
        config,
        vec![
            Step::Fail(TransportErrorKind::Connect),
            respond(&["HTTP/1.1 302 Found", "Location: /x"]),
        ],
    );

    let response = get(&h.client, "https://example.com/").expect("call should succeed");
    assert_eq!(response.status_code(), 302);
    assert_eq!(h.transport.seen()[1].header("user-agent"), Some("from-json/2"));
    assert_eq!(h.sleeper.delays().len(), 1);
}

#[test]
fn builder_surfaces_configuration_errors() {
    let error = HttpClient::builder()
        .timeout_secs(0.0)
        .max_retries(2)
        .try_build()
        .expect_err("zero timeout must fail");
    assert_eq!(error.code(), ErrorCode::InvalidConfig);

    let error = HttpClient::builder()
        .trust_hosts(["not a host"])
        .try_build()
        .expect_err("invalid trusted host must fail");
    assert_eq!(error.code(), ErrorCode::InvalidConfig);
}

struct RoutingTransport;

impl Transport for RoutingTransport {
    fn fetch(&self, request: &TransportRequest<'_>) -> Result<RawResponse, TransportFailure> {
        let header_lines = if request.url.ends_with("/start") {
            vec![
                "HTTP/1.1 302 Found".to_owned(),
                "Location: /end".to_owned(),
            ]
        } else {
            vec!["HTTP/1.1 200 OK".to_owned()]
        };
        Ok(RawResponse {
            header_lines,
            body: Bytes::new(),
        })
    }
}

#[test]
fn concurrent_calls_keep_independent_state() {
    let client = HttpClient::builder()
        .transport(RoutingTransport)
        .resolver(MapResolver::new(&[("example.com", EXAMPLE_IP)]))
        .sleeper(RecordingSleeper::default())
        .max_redirects(1)
        .try_build()
        .expect("client should build");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            thread::spawn(move || {
                client
                    .send_with_state(RequestSpec::new(Method::Get, "https://example.com/start"))
                    .expect("call should succeed")
            })
        })
        .collect();

    for handle in handles {
        let (response, state) = handle.join().expect("worker thread");
        assert_eq!(response.status_code(), 200);
        assert_eq!(state.redirects_followed(), 1);
        assert_eq!(state.retries_attempted(), 0);
    }
}
