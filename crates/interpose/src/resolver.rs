//! Endpoint resolution
//!
//! Turns the textual listen/forward endpoints into concrete socket addresses
//! once, before the proxy accepts anything.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::ProxyError;

/// Transport network family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// IPv4 or IPv6, preferring IPv4 when a name resolves to both
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    /// Whether an address belongs to this family
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }

    fn unspecified(self) -> IpAddr {
        match self {
            Network::Tcp | Network::Tcp4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Network::Tcp6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            _ => Err(ProxyError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Which of the two configured endpoints an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Listen,
    Forward,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Listen => f.write_str("listen"),
            Endpoint::Forward => f.write_str("forward"),
        }
    }
}

/// Resolve `input` (`host:port`, `[v6]:port` or `:port`) to one address of
/// the given network family.
pub async fn resolve(
    network: Network,
    endpoint: Endpoint,
    input: &str,
) -> Result<SocketAddr, ProxyError> {
    let wrap = |source: io::Error| ProxyError::Resolve {
        endpoint,
        input: input.to_string(),
        source,
    };

    // ":8080" means every local address of the family
    if let Some(port) = input.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| {
            wrap(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid port {:?}", port),
            ))
        })?;
        return Ok(SocketAddr::new(network.unspecified(), port));
    }

    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(input)
        .await
        .map_err(wrap)?
        .filter(|addr| network.accepts(addr))
        .collect();

    let chosen = match network {
        Network::Tcp => candidates
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| candidates.first()),
        Network::Tcp4 | Network::Tcp6 => candidates.first(),
    };

    let addr = chosen.copied().ok_or_else(|| {
        wrap(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address found", network),
        ))
    })?;

    tracing::debug!("Resolved {} address {} -> {}", endpoint, input, addr);
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("TCP6".parse::<Network>().unwrap(), Network::Tcp6);
        assert_eq!("tcp4".parse::<Network>().unwrap(), Network::Tcp4);
        assert!(matches!(
            "udp".parse::<Network>(),
            Err(ProxyError::UnknownNetwork(s)) if s == "udp"
        ));
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve(Network::Tcp, Endpoint::Listen, "127.0.0.1:9997")
            .await
            .unwrap();
        assert_eq!(addr, "127.0.0.1:9997".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_empty_host() {
        let addr = resolve(Network::Tcp, Endpoint::Listen, ":8080").await.unwrap();
        assert_eq!(addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());

        let addr = resolve(Network::Tcp6, Endpoint::Listen, ":8080").await.unwrap();
        assert_eq!(addr, "[::]:8080".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_wrong_family() {
        let err = resolve(Network::Tcp4, Endpoint::Forward, "[::1]:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Resolve { endpoint: Endpoint::Forward, .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_missing_port() {
        let err = resolve(Network::Tcp, Endpoint::Listen, "no-port-here")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Resolve { endpoint: Endpoint::Listen, .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_bad_port() {
        assert!(resolve(Network::Tcp, Endpoint::Listen, ":http").await.is_err());
    }
}
