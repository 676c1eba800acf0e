use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use ureq::http::{StatusCode, Uri, Version};
use ureq::unversioned::resolver::{ResolvedSocketAddrs, Resolver as UreqResolver};
use ureq::unversioned::transport::{DefaultConnector, NextTimeout};

use super::{RawResponse, Transport, TransportErrorKind, TransportFailure, TransportRequest};
use crate::guard::parse_ip_literal;
use crate::location::{UrlParts, replace_host};

/// Default [`Transport`] backed by a blocking `ureq` agent.
///
/// When the request URL carries an IP that was resolved from `tls_host`, the
/// request goes out for the host name while a pinned resolver hands `ureq`
/// only that IP, so TLS and `Host` see the name and the socket goes to the
/// validated address.
#[derive(Clone, Debug, Default)]
pub struct BlockingTransport;

impl BlockingTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for BlockingTransport {
    fn fetch(&self, request: &TransportRequest<'_>) -> Result<RawResponse, TransportFailure> {
        let (request_url, pinned_ip) = pinned_target(request);
        let agent = make_agent(request.options.connect_timeout, pinned_ip);

        let builder = build_request(request, &request_url)?;
        let mut response = match request.body {
            Some(body) => run(&agent, builder.body(body.to_vec()), request.timeout)?,
            None => run(&agent, builder.body(()), request.timeout)?,
        };

        let mut header_lines = Vec::with_capacity(response.headers().len() + 1);
        header_lines.push(status_line(response.version(), response.status()));
        for (name, value) in response.headers() {
            header_lines.push(format!(
                "{}: {}",
                name,
                String::from_utf8_lossy(value.as_bytes())
            ));
        }

        let body = read_all_body_limited(&mut response, request.options.max_response_body_bytes)?;
        Ok(RawResponse { header_lines, body })
    }
}

/// `ureq` does not surface the server's reason phrase, so the canonical one
/// for the code is used and unknown codes get none.
fn status_line(version: Version, status: StatusCode) -> String {
    format!(
        "{:?} {} {}",
        version,
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
}

/// Returns the URL to hand to `ureq` and the address to pin it to.
fn pinned_target(request: &TransportRequest<'_>) -> (String, Option<IpAddr>) {
    let target_host = UrlParts::parse(request.url).host;
    let target_ip = target_host.as_deref().and_then(parse_ip_literal);
    match target_ip {
        Some(ip) if parse_ip_literal(request.tls_host).is_none() => {
            (replace_host(request.url, request.tls_host), Some(ip))
        }
        _ => (request.url.to_owned(), None),
    }
}

fn make_agent(connect_timeout: Option<Duration>, pinned_ip: Option<IpAddr>) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .timeout_connect(connect_timeout)
        // Proxies from the environment would pick the destination themselves.
        .proxy(None)
        .build();
    match pinned_ip {
        Some(ip) => {
            ureq::Agent::with_parts(config, DefaultConnector::new(), PinnedResolver { ip })
        }
        None => config.new_agent(),
    }
}

fn build_request(
    request: &TransportRequest<'_>,
    url: &str,
) -> Result<ureq::http::request::Builder, TransportFailure> {
    let uri: Uri = url
        .parse()
        .map_err(|source| TransportFailure::new(TransportErrorKind::Other, source))?;
    let mut builder = ureq::http::Request::builder()
        .method(http::Method::from(request.method))
        .uri(uri);
    for line in request.headers {
        if let Some((name, value)) = line.split_once(':') {
            builder = builder.header(name.trim(), value.trim());
        }
    }
    Ok(builder)
}

fn run<S: ureq::AsSendBody>(
    agent: &ureq::Agent,
    request: Result<ureq::http::Request<S>, ureq::http::Error>,
    timeout: Option<Duration>,
) -> Result<ureq::http::Response<ureq::Body>, TransportFailure> {
    let request =
        request.map_err(|source| TransportFailure::new(TransportErrorKind::Other, source))?;
    let configured = agent
        .configure_request(request)
        .timeout_global(timeout)
        .build();
    agent
        .run(configured)
        .map_err(|source| TransportFailure::new(classify_ureq_transport_error(&source), source))
}

#[derive(Debug)]
struct PinnedResolver {
    ip: IpAddr,
}

impl UreqResolver for PinnedResolver {
    fn resolve(
        &self,
        uri: &Uri,
        _config: &ureq::config::Config,
        _timeout: NextTimeout,
    ) -> Result<ResolvedSocketAddrs, ureq::Error> {
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("https") => 443,
            _ => 80,
        });
        let mut addresses = self.empty();
        addresses.push(SocketAddr::new(self.ip, port));
        Ok(addresses)
    }
}

fn classify_ureq_transport_error(error: &ureq::Error) -> TransportErrorKind {
    match error {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::Tls(_) => TransportErrorKind::Tls,
        ureq::Error::ConnectProxyFailed(_) | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Connect
        }
        ureq::Error::Io(source) => classify_io_error(source),
        _ => TransportErrorKind::Other,
    }
}

fn classify_io_error(error: &std::io::Error) -> TransportErrorKind {
    match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            TransportErrorKind::Timeout
        }
        std::io::ErrorKind::NotFound => TransportErrorKind::Dns,
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
        _ => TransportErrorKind::Other,
    }
}

fn read_all_body_limited(
    response: &mut ureq::http::Response<ureq::Body>,
    max_bytes: usize,
) -> Result<Bytes, TransportFailure> {
    let mut reader = response.body_mut().as_reader();
    let mut collected = Vec::new();
    let mut chunk = [0_u8; 8192];
    let mut total_len = 0_usize;

    loop {
        let read = reader.read(&mut chunk).map_err(|source| {
            let kind = match source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<ureq::Error>())
            {
                Some(ureq_error) => classify_ureq_transport_error(ureq_error),
                None => TransportErrorKind::Read,
            };
            TransportFailure::new(kind, source)
        })?;
        if read == 0 {
            break;
        }
        total_len = total_len.saturating_add(read);
        if total_len > max_bytes {
            return Err(TransportFailure::new(
                TransportErrorKind::Read,
                format!("response body exceeds {max_bytes} bytes"),
            ));
        }
        collected.extend_from_slice(&chunk[..read]);
    }

    Ok(Bytes::from(collected))
}
