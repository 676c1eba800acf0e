use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::config::TransportOptions;
use crate::request::Method;

mod blocking;

pub use blocking::BlockingTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Timeout,
    Other,
}

impl TransportErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The exchange could not be completed at all. HTTP error statuses are
/// responses, not failures.
#[derive(Debug, Error)]
#[error("{kind} failure: {source}")]
pub struct TransportFailure {
    kind: TransportErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportFailure {
    pub fn new(
        kind: TransportErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

/// One attempt as handed to a [`Transport`].
#[derive(Clone, Copy, Debug)]
pub struct TransportRequest<'a> {
    pub method: Method,
    /// Network destination; the host may be a validated IP rewritten from
    /// `tls_host`.
    pub url: &'a str,
    /// Host name for certificate verification.
    pub tls_host: &'a str,
    /// Outbound headers as `name: value` lines.
    pub headers: &'a [String],
    pub body: Option<&'a Bytes>,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
    pub options: &'a TransportOptions,
}

/// Raw output of a completed exchange: status line, then header lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub header_lines: Vec<String>,
    pub body: Bytes,
}

/// Sends one request without following redirects and without treating
/// error statuses as failures.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &TransportRequest<'_>) -> Result<RawResponse, TransportFailure>;
}
