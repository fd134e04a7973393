//! Caller locality classification and the negotiation policy derived from it
//!
//! Callers reaching the gateway from the same host or a private network skip
//! STUN entirely and are pinned to a small ephemeral port range; everyone else
//! gets the public STUN list.

use crate::config::NegotiationConfig;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Where a caller is relative to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// Same host or private network (loopback, link-local, RFC1918, ULA)
    Local,
    /// Anything else
    Remote,
}

impl Locality {
    /// Classify a caller by its host identifier
    ///
    /// Accepts a bare hostname, an IP literal, `host:port`, or `[v6]:port`.
    /// Pure function of its input.
    pub fn classify(host: &str) -> Self {
        let host = host.trim().to_ascii_lowercase();

        match parse_host(&host) {
            HostId::Ip(ip) if is_private_ip(ip) => Locality::Local,
            HostId::Name(name) if name == "localhost" || name.ends_with(".localhost") => {
                Locality::Local
            }
            _ => Locality::Remote,
        }
    }

    pub fn is_local(self) -> bool {
        self == Locality::Local
    }
}

impl std::fmt::Display for Locality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locality::Local => write!(f, "local"),
            Locality::Remote => write!(f, "remote"),
        }
    }
}

enum HostId<'a> {
    Ip(IpAddr),
    Name(&'a str),
}

fn parse_host(host: &str) -> HostId<'_> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return HostId::Ip(ip);
    }
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return HostId::Ip(addr.ip());
    }
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((inner, _)) = rest.split_once(']') {
            if let Ok(ip) = inner.parse::<Ipv6Addr>() {
                return HostId::Ip(IpAddr::V6(ip));
            }
        }
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            HostId::Name(name)
        }
        _ => HostId::Name(host),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_v4(v4);
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || (first & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (first & 0xffc0) == 0xfe80 // link local fe80::/10
        }
    }
}

/// Inclusive UDP port range for ICE host candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

/// Negotiation policy computed once per request and passed immutably to the negotiator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalityPolicy {
    /// Caller classification this policy was derived from
    pub locality: Locality,

    /// STUN servers (empty for local callers)
    pub ice_servers: Vec<String>,

    /// Ephemeral port restriction (local callers only)
    pub port_range: Option<PortRange>,

    /// Gather loopback candidates (local callers only)
    pub include_loopback: bool,
}

impl LocalityPolicy {
    /// Policy for an already classified caller
    pub fn for_locality(locality: Locality, config: &NegotiationConfig) -> Self {
        match locality {
            Locality::Local => Self {
                locality,
                ice_servers: Vec::new(),
                port_range: Some(PortRange {
                    min: config.local_port_min,
                    max: config.local_port_max,
                }),
                include_loopback: true,
            },
            Locality::Remote => Self {
                locality,
                ice_servers: config.stun_servers.clone(),
                port_range: None,
                include_loopback: false,
            },
        }
    }

    /// Classify `host` and build its policy
    pub fn for_caller(host: &str, config: &NegotiationConfig) -> Self {
        Self::for_locality(Locality::classify(host), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_hosts_are_local() {
        assert_eq!(Locality::classify("localhost"), Locality::Local);
        assert_eq!(Locality::classify("localhost:8080"), Locality::Local);
        assert_eq!(Locality::classify("LOCALHOST"), Locality::Local);
        assert_eq!(Locality::classify("app.localhost:3000"), Locality::Local);
        assert_eq!(Locality::classify("127.0.0.1"), Locality::Local);
        assert_eq!(Locality::classify("127.0.0.1:8080"), Locality::Local);
        assert_eq!(Locality::classify("::1"), Locality::Local);
        assert_eq!(Locality::classify("[::1]:8080"), Locality::Local);
    }

    #[test]
    fn test_private_ranges_are_local() {
        for host in [
            "10.0.0.5",
            "172.16.4.1:8080",
            "172.31.255.254",
            "192.168.1.20:8080",
            "169.254.10.10",
            "[fd00::1]:8080",
            "fe80::1",
            "::ffff:192.168.0.1",
        ] {
            assert_eq!(Locality::classify(host), Locality::Local, "{}", host);
        }
    }

    #[test]
    fn test_public_hosts_are_remote() {
        for host in [
            "8.8.8.8",
            "172.32.0.1",
            "203.0.113.7:443",
            "example.com",
            "example.com:8080",
            "10.example.com",
            "[2001:db8::1]:443",
            "",
        ] {
            assert_eq!(Locality::classify(host), Locality::Remote, "{}", host);
        }
    }

    #[test]
    fn test_local_policy_has_no_stun_and_bounded_ports() {
        let config = NegotiationConfig::default();
        let policy = LocalityPolicy::for_caller("192.168.0.10:8080", &config);

        assert!(policy.ice_servers.is_empty());
        assert_eq!(policy.port_range, Some(PortRange { min: 50000, max: 50100 }));
        assert!(policy.include_loopback);
    }

    #[test]
    fn test_remote_policy_uses_stun() {
        let config = NegotiationConfig::default();
        let policy = LocalityPolicy::for_caller("gateway.example.org", &config);

        assert_eq!(policy.locality, Locality::Remote);
        assert_eq!(policy.ice_servers, vec!["stun:stun.l.google.com:19302".to_string()]);
        assert!(policy.port_range.is_none());
    }

    #[test]
    fn test_port_range_contains() {
        let range = PortRange { min: 50000, max: 50100 };
        assert!(range.contains(50000));
        assert!(range.contains(50100));
        assert!(!range.contains(50101));
    }
}
