use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::util::{is_valid_host_name, validate_base_url};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: usize = 3;
pub const DEFAULT_MAX_RETRIES: usize = 0;
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn default_user_agent() -> String {
    format!("safereq/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings passed through to the transport untouched by the request pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Option<Duration>,
    pub max_response_body_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

/// Immutable client configuration.
///
/// Setters consume and return the configuration; a built client shares it
/// read-only across every call.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawClientConfig")]
pub struct ClientConfig {
    timeout: Option<Duration>,
    max_redirects: usize,
    max_retries: usize,
    strict_redirects: bool,
    user_agent: String,
    base_uri: Option<String>,
    trusted_hosts: BTreeSet<String>,
    transport_options: TransportOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_retries: DEFAULT_MAX_RETRIES,
            strict_redirects: false,
            user_agent: default_user_agent(),
            base_uri: None,
            trusted_hosts: BTreeSet::new(),
            transport_options: TransportOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Sets the transport timeout in seconds. Negative values disable the
    /// timeout; zero and NaN are rejected.
    pub fn with_timeout_secs(mut self, seconds: f64) -> crate::Result<Self> {
        self.timeout = timeout_from_secs(seconds)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> crate::Result<Self> {
        if timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::invalid_config("timeout must not be zero"));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// `0` disables redirect following.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Keep method and body on 301/302 like RFC 7231 instead of downgrading
    /// to GET like browsers do.
    pub fn with_strict_redirects(mut self, strict_redirects: bool) -> Self {
        self.strict_redirects = strict_redirects;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_base_uri(mut self, base_uri: &str) -> crate::Result<Self> {
        let trimmed = base_uri.trim_end_matches('/');
        validate_base_url(trimmed)?;
        self.base_uri = Some(trimmed.to_owned());
        Ok(self)
    }

    /// Adds hosts that bypass resolution and address validation.
    pub fn trust_hosts<I, S>(mut self, hosts: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            let host = host.as_ref();
            if !is_valid_host_name(host) {
                return Err(Error::invalid_config(format!("invalid hostname {host:?}")));
            }
            self.trusted_hosts.insert(host.to_ascii_lowercase());
        }
        Ok(self)
    }

    pub fn with_transport_options(mut self, transport_options: TransportOptions) -> Self {
        self.transport_options = transport_options;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn strict_redirects(&self) -> bool {
        self.strict_redirects
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn trusted_hosts(&self) -> &BTreeSet<String> {
        &self.trusted_hosts
    }

    pub fn transport_options(&self) -> &TransportOptions {
        &self.transport_options
    }

    pub fn is_trusted_host(&self, host: &str) -> bool {
        if self.trusted_hosts.is_empty() {
            return false;
        }
        self.trusted_hosts.contains(&host.to_ascii_lowercase())
    }
}

fn timeout_from_secs(seconds: f64) -> crate::Result<Option<Duration>> {
    if seconds.is_nan() {
        return Err(Error::invalid_config("timeout must be a number"));
    }
    if seconds == 0.0 {
        return Err(Error::invalid_config(
            "timeout can't be 0; a negative value means an infinite timeout",
        ));
    }
    if seconds < 0.0 {
        return Ok(None);
    }
    Ok(Duration::try_from_secs_f64(seconds).ok())
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawClientConfig {
    timeout_secs: f64,
    max_redirects: usize,
    max_retries: usize,
    strict_redirects: bool,
    user_agent: Option<String>,
    base_uri: Option<String>,
    trusted_hosts: Vec<String>,
    transport: RawTransportOptions,
}

impl Default for RawClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs_f64(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_retries: DEFAULT_MAX_RETRIES,
            strict_redirects: false,
            user_agent: None,
            base_uri: None,
            trusted_hosts: Vec::new(),
            transport: RawTransportOptions::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTransportOptions {
    connect_timeout_secs: Option<f64>,
    max_response_body_bytes: Option<usize>,
}

impl TryFrom<RawTransportOptions> for TransportOptions {
    type Error = Error;

    fn try_from(raw: RawTransportOptions) -> Result<Self, Self::Error> {
        let connect_timeout = match raw.connect_timeout_secs {
            Some(seconds) => timeout_from_secs(seconds)?,
            None => None,
        };
        Ok(Self {
            connect_timeout,
            max_response_body_bytes: raw
                .max_response_body_bytes
                .unwrap_or(DEFAULT_MAX_RESPONSE_BODY_BYTES),
        })
    }
}

impl TryFrom<RawClientConfig> for ClientConfig {
    type Error = Error;

    fn try_from(raw: RawClientConfig) -> Result<Self, Self::Error> {
        let mut config = ClientConfig::default()
            .with_timeout_secs(raw.timeout_secs)?
            .with_max_redirects(raw.max_redirects)
            .with_max_retries(raw.max_retries)
            .with_strict_redirects(raw.strict_redirects)
            .trust_hosts(&raw.trusted_hosts)?
            .with_transport_options(raw.transport.try_into()?);
        if let Some(user_agent) = raw.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(base_uri) = raw.base_uri {
            config = config.with_base_uri(&base_uri)?;
        }
        Ok(config)
    }
}
