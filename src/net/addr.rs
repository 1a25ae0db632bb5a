//! Bind address resolution.
//!
//! A bind address is `host:port`. The host is normally used as-is
//! (`0.0.0.0:4431`, `[::1]:4431`), but when it is an IP prefix such as
//! `100.64.0.0/10` it is matched against the addresses assigned to local
//! interfaces, which lets the proxy bind to e.g. a VPN address without
//! knowing it in advance.

use std::fmt;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;
use thiserror::Error;

/// Error type for bind address handling.
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("too many colons in address {0:?} (IPv6 hosts must be bracketed)")]
    TooManyColons(String),

    #[error("invalid IP prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    #[error("failed to list interface addresses: {0}")]
    Interfaces(#[from] nix::Error),

    #[error("none of the interfaces have an address in prefix {0}")]
    NoMatchingInterface(IpPrefix),
}

/// Split `host:port` into its parts. The host may be empty or bracketed.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), AddrError> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| AddrError::MissingPort(addr.to_string()))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| AddrError::MissingPort(addr.to_string()))?;
        (host, port)
    } else {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| AddrError::MissingPort(addr.to_string()))?;
        if host.contains(':') {
            return Err(AddrError::TooManyColons(addr.to_string()));
        }
        (host, port)
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| AddrError::InvalidPort(port.to_string()))?;

    Ok((host, port))
}

/// Join a host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// An IP network prefix such as `100.64.0.0/10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Whether `ip` falls inside this prefix. Families never match each other.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.len as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.len as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpPrefix {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| AddrError::InvalidPrefix { prefix: s.to_string(), reason };

        let (addr, len) = s.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid("bad address"))?;
        let len: u8 = len.parse().map_err(|_| invalid("bad prefix length"))?;

        let max = if addr.is_ipv4() { 32 } else { 128 };
        if len > max {
            return Err(invalid("prefix length out of range"));
        }

        Ok(Self { addr, len })
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// Resolve a configured bind address into something `TcpListener::bind` takes.
///
/// `"0.0.0.0:4431"` is returned unchanged; `"100.64.0.0/10:4431"` becomes e.g.
/// `"100.100.1.2:4431"` depending on the host's assigned addresses. An empty
/// host binds every IPv4 interface.
pub fn resolve_bind_address(addr: &str) -> Result<String, AddrError> {
    let (host, port) = split_host_port(addr)?;

    if host.is_empty() {
        return Ok(join_host_port("0.0.0.0", port));
    }

    if !host.contains('/') {
        return Ok(join_host_port(host, port));
    }

    let prefix: IpPrefix = host.parse()?;
    let ip = select_address(&prefix, interface_addresses()?)
        .ok_or(AddrError::NoMatchingInterface(prefix))?;

    tracing::debug!(%prefix, address = %ip, "Resolved bind prefix to interface address");
    Ok(join_host_port(&ip.to_string(), port))
}

/// Pick the first address contained in `prefix`.
pub fn select_address<I>(prefix: &IpPrefix, addrs: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find(|ip| prefix.contains(*ip))
}

/// Addresses currently assigned to local interfaces.
fn interface_addresses() -> Result<Vec<IpAddr>, AddrError> {
    let addrs = nix::ifaddrs::getifaddrs()?
        .filter_map(|ifaddr| {
            let storage = ifaddr.address?;
            if let Some(sin) = storage.as_sockaddr_in() {
                Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()))
            } else {
                storage
                    .as_sockaddr_in6()
                    .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
            }
        })
        .collect();
    Ok(addrs)
}
