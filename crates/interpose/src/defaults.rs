//! Ready-made callback sets

use bytes::BytesMut;
use tokio::net::TcpStream;

use crate::callbacks::Callbacks;
use crate::direction::{ConnectionId, Direction};
use crate::error::ConnectionError;

/// Accepts everything, relays everything unchanged, and logs lifecycle events
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallbacks;

impl Callbacks for LoggingCallbacks {
    fn on_connect(&self, id: ConnectionId, stream: &TcpStream) -> bool {
        match stream.peer_addr() {
            Ok(peer) => tracing::info!("Accept: connection {} from {}", id, peer),
            Err(_) => tracing::info!("Accept: connection {} from unknown peer", id),
        }
        true
    }

    fn on_receive(&self, _id: ConnectionId, _direction: Direction, _chunk: &mut BytesMut) -> bool {
        true
    }

    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError) {
        match error {
            ConnectionError::PeerClosed => {
                tracing::debug!("Connection {} {}: {}", id, direction, error)
            }
            _ => tracing::warn!("Error: connection {} {}: {}", id, direction, error),
        }
    }

    fn on_close(&self, id: ConnectionId, direction: Direction) {
        tracing::info!("Closed: connection {} {}", id, direction);
    }
}

/// [`LoggingCallbacks`] plus a log line with the contents of every chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadPrinter;

impl Callbacks for PayloadPrinter {
    fn on_connect(&self, id: ConnectionId, stream: &TcpStream) -> bool {
        LoggingCallbacks.on_connect(id, stream)
    }

    fn on_receive(&self, id: ConnectionId, direction: Direction, chunk: &mut BytesMut) -> bool {
        tracing::info!(
            "Payload: {} {} ({} bytes): {:?}",
            id,
            direction,
            chunk.len(),
            String::from_utf8_lossy(&chunk[..])
        );
        true
    }

    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError) {
        LoggingCallbacks.on_error(id, direction, error)
    }

    fn on_close(&self, id: ConnectionId, direction: Direction) {
        LoggingCallbacks.on_close(id, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_chunks_unchanged() {
        let mut chunk = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(LoggingCallbacks.on_receive(ConnectionId::new(1), Direction::Upstream, &mut chunk));
        assert!(PayloadPrinter.on_receive(ConnectionId::new(1), Direction::Upstream, &mut chunk));
        assert_eq!(&chunk[..], b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn test_default_gate_accepts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let _client = client.unwrap();
        let (stream, _) = accepted.unwrap();

        assert!(LoggingCallbacks.on_connect(ConnectionId::new(7), &stream));
    }
}
