//! Platform DNS resolver that enforces an address policy on every answer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use crate::guard::{ResolutionError, Resolver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressPolicy {
    allow_internal: bool,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl AddressPolicy {
    /// Only publicly routable unicast addresses.
    pub const fn strict() -> Self {
        Self {
            allow_internal: false,
        }
    }

    /// Everything except the unspecified address.
    pub const fn permissive() -> Self {
        Self {
            allow_internal: true,
        }
    }

    pub fn allows_ip(self, ip: IpAddr) -> bool {
        if ip.is_unspecified() {
            return false;
        }
        if self.allow_internal {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => !is_internal_ipv4(v4),
            IpAddr::V6(v6) => !is_internal_ipv6(v6),
        }
    }

    pub fn allows_host_name(self, host: &str) -> bool {
        self.allow_internal || !is_localhost_name(host)
    }
}

fn is_internal_ipv4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_unspecified()
        // 0.0.0.0/8
        || first == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (first == 100 && (second & 0xc0) == 64)
        // 240.0.0.0/4
        || first >= 240
}

fn is_internal_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_internal_ipv4(mapped);
    }
    let first_segment = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first_segment & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first_segment & 0xffc0) == 0xfe80
}

fn is_localhost_name(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost"
        || host.ends_with(".localhost")
        || host == "localhost.localdomain"
        || host == "ip6-localhost"
        || host == "ip6-loopback"
}

/// Resolves through the operating system and rejects the host when any
/// returned address falls outside the configured [`AddressPolicy`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver {
    policy: AddressPolicy,
}

impl SystemResolver {
    pub const fn new(policy: AddressPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> AddressPolicy {
        self.policy
    }
}

impl Resolver for SystemResolver {
    fn resolve_to_ip(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        if !self.policy.allows_host_name(host) {
            return Err(ResolutionError::DisallowedHost {
                host: host.to_owned(),
            });
        }

        let addresses = (host, 0_u16)
            .to_socket_addrs()
            .map_err(|source| ResolutionError::Lookup {
                host: host.to_owned(),
                source,
            })?;

        let mut selected = None;
        for address in addresses {
            let ip = address.ip();
            if !self.policy.allows_ip(ip) {
                return Err(ResolutionError::Disallowed {
                    host: host.to_owned(),
                    ip,
                });
            }
            selected.get_or_insert(ip);
        }
        selected.ok_or_else(|| ResolutionError::NoAddresses {
            host: host.to_owned(),
        })
    }
}
