use std::net::IpAddr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::location::replace_host;

/// Resolves a host name to a single address that is safe to connect to.
pub trait Resolver: Send + Sync {
    fn resolve_to_ip(&self, host: &str) -> Result<IpAddr, ResolutionError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolutionError {
    #[error("{host} did not resolve to any address")]
    NoAddresses { host: String },
    #[error("{host} resolves to disallowed address {ip}")]
    Disallowed { host: String, ip: IpAddr },
    #[error("{host} is not allowed by the address policy")]
    DisallowedHost { host: String },
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parses an IPv4 or IPv6 literal, accepting the bracketed URL form of IPv6.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host);
    unbracketed.parse().ok()
}

/// Returns the URL to connect to for `host`.
///
/// Trusted hosts and IP literals pass through untouched without consulting
/// `resolver`. Any other host is resolved and the URL host is rewritten to
/// the validated address; the caller keeps `host` for `Host` and TLS.
pub fn resolve_target(
    url: &str,
    host: &str,
    config: &ClientConfig,
    resolver: &dyn Resolver,
) -> crate::Result<String> {
    if config.is_trusted_host(host) {
        debug!(host, "trusted host bypasses resolution");
        return Ok(url.to_owned());
    }
    if parse_ip_literal(host).is_some() {
        debug!(host, "ip literal bypasses resolution");
        return Ok(url.to_owned());
    }

    let ip = resolver.resolve_to_ip(host).map_err(|source| {
        warn!(host, error = %source, "resolver rejected target host");
        Error::TargetResolution {
            host: host.to_owned(),
            source,
        }
    })?;
    debug!(host, %ip, "resolved target host");

    let ip_host = match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    };
    Ok(replace_host(url, &ip_host))
}
