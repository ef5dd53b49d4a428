use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::resolver::Endpoint;

/// Errors returned to the caller of [`Proxy::new`](crate::Proxy::new) and
/// [`Proxy::serve`](crate::Proxy::serve)
#[derive(Debug, Error)]
pub enum ProxyError {
    /// An endpoint string could not be resolved under the configured network
    #[error("while resolving {endpoint} address {input:?}: {source}")]
    Resolve {
        endpoint: Endpoint,
        input: String,
        #[source]
        source: io::Error,
    },

    /// The listen address could not be bound
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `serve` was called on a proxy that is already accepting
    #[error("serve() called more than once")]
    AlreadyServing,

    /// Network family string not recognized
    #[error("unknown network {0:?} (expected tcp, tcp4 or tcp6)")]
    UnknownNetwork(String),
}

/// Per-connection failures. These never reach the caller; they are handed to
/// the error-sink callback and the connection (never the proxy) is torn down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("while accepting connection: {0}")]
    Accept(#[source] io::Error),

    #[error("connection rejected by connect callback")]
    Rejected,

    #[error("while connecting to forward address {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Clean EOF from the source side
    #[error("connection closed by peer")]
    PeerClosed,

    #[error("while reading: {0}")]
    Read(#[source] io::Error),

    #[error("while writing: {0}")]
    Write(#[source] io::Error),
}

impl ConnectionError {
    pub fn dial(addr: SocketAddr, source: io::Error) -> Self {
        Self::Dial { addr, source }
    }

    /// True for failures that end the relay loop of one direction
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::Read(_) | Self::Write(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_names_endpoint() {
        let err = ProxyError::Resolve {
            endpoint: Endpoint::Forward,
            input: "nowhere".to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "invalid socket address"),
        };
        let msg = err.to_string();
        assert!(msg.contains("forward"));
        assert!(msg.contains("\"nowhere\""));
    }

    #[test]
    fn test_terminal_errors() {
        assert!(ConnectionError::PeerClosed.is_terminal());
        assert!(ConnectionError::Write(io::ErrorKind::BrokenPipe.into()).is_terminal());
        assert!(!ConnectionError::Rejected.is_terminal());
        assert!(!ConnectionError::Accept(io::ErrorKind::Other.into()).is_terminal());
    }
}
