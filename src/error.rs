use thiserror::Error;

use crate::guard::ResolutionError;
use crate::request::Method;
use crate::transport::TransportFailure;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    TargetResolution,
    RequestFailed,
    MalformedStatusLine,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidMethod,
    InvalidConfig,
    SerializeJson,
    Deserialize,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::TargetResolution => "target_resolution",
            Self::RequestFailed => "request_failed",
            Self::MalformedStatusLine => "malformed_status_line",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::InvalidMethod => "invalid_method",
            Self::InvalidConfig => "invalid_config",
            Self::SerializeJson => "serialize_json",
            Self::Deserialize => "deserialize",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
    #[error("refusing to connect to {host}: {source}")]
    TargetResolution {
        host: String,
        #[source]
        source: ResolutionError,
    },
    #[error(
        "failed to {method} {url} after {retries} retries ({redirects_followed} redirects followed): {source}"
    )]
    RequestFailed {
        method: Method,
        url: String,
        retries: usize,
        redirects_followed: usize,
        #[source]
        source: TransportFailure,
    },
    #[error("{line:?} is not a valid http status line")]
    MalformedStatusLine { line: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("unsupported http method {method:?}")]
    InvalidMethod { method: String },
    #[error("invalid client configuration: {message}")]
    InvalidConfig { message: String },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::TargetResolution { .. } => ErrorCode::TargetResolution,
            Self::RequestFailed { .. } => ErrorCode::RequestFailed,
            Self::MalformedStatusLine { .. } => ErrorCode::MalformedStatusLine,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::InvalidMethod { .. } => ErrorCode::InvalidMethod,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Serialize { .. } => ErrorCode::SerializeJson,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: &'static str) -> Self {
        Self::InvalidUrl {
            url: url.to_owned(),
            reason,
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
