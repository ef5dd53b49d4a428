use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::callbacks::Callbacks;
use crate::direction::{ConnectionId, Direction};
use crate::error::ConnectionError;
use crate::forwarder::Forwarder;

/// What every connection task needs from the proxy
pub(crate) struct ConnectionContext {
    pub forward_addr: SocketAddr,
    pub callbacks: Arc<dyn Callbacks>,
    pub root: CancellationToken,
}

impl ConnectionContext {
    /// Gate, dial, relay, and tear down one accepted connection
    pub(crate) async fn handle(self: Arc<Self>, id: ConnectionId, inbound: TcpStream) {
        if !self.callbacks.on_connect(id, &inbound) {
            tracing::debug!("Connection {} rejected", id);
            drop(inbound);
            self.callbacks
                .on_error(id, Direction::None, &ConnectionError::Rejected);
            return;
        }

        let outbound = match TcpStream::connect(self.forward_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                drop(inbound);
                self.callbacks.on_error(
                    id,
                    Direction::Upstream,
                    &ConnectionError::dial(self.forward_addr, e),
                );
                return;
            }
        };

        tracing::debug!("Connection {} relaying to {}", id, self.forward_addr);

        let scope = self.root.child_token();

        let (inbound_read, inbound_write) = inbound.into_split();
        let (outbound_read, outbound_write) = outbound.into_split();

        let upstream = tokio::spawn(
            Forwarder::new(id, Direction::Upstream, self.callbacks.clone(), scope.clone())
                .run(inbound_read, outbound_write),
        );
        let downstream = tokio::spawn(
            Forwarder::new(id, Direction::Downstream, self.callbacks.clone(), scope.clone())
                .run(outbound_read, inbound_write),
        );

        scope.cancelled().await;

        // Both forwarders watch the scope, so neither outlives this join.
        // Each socket is closed when its two halves are dropped here, and
        // only here.
        let (upstream, downstream) = tokio::join!(upstream, downstream);
        match (upstream, downstream) {
            (Ok((inbound_read, outbound_write)), Ok((outbound_read, inbound_write))) => {
                close(id, "inbound", inbound_read.reunite(inbound_write));
                close(id, "outbound", outbound_read.reunite(outbound_write));
            }
            (upstream, downstream) => {
                // A panicking hook already dropped its halves while unwinding
                for result in [upstream.err(), downstream.err()].into_iter().flatten() {
                    tracing::error!("Connection {} forwarder task failed: {}", id, result);
                }
            }
        }

        tracing::debug!("Connection {} closed", id);
    }
}

fn close(
    id: ConnectionId,
    side: &str,
    stream: Result<TcpStream, tokio::net::tcp::ReuniteError>,
) {
    match stream {
        Ok(stream) => drop(stream),
        Err(e) => tracing::warn!("Connection {} {} halves did not match: {}", id, side, e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    struct Gate {
        accept: bool,
        errors: Mutex<Vec<(Direction, String)>>,
        closes: Mutex<Vec<Direction>>,
    }

    impl Gate {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self {
                accept,
                errors: Mutex::new(Vec::new()),
                closes: Mutex::new(Vec::new()),
            })
        }
    }

    impl Callbacks for Gate {
        fn on_connect(&self, _: ConnectionId, _: &TcpStream) -> bool {
            self.accept
        }

        fn on_receive(&self, _: ConnectionId, _: Direction, _: &mut BytesMut) -> bool {
            true
        }

        fn on_error(&self, _: ConnectionId, direction: Direction, error: &ConnectionError) {
            self.errors.lock().push((direction, error.to_string()));
        }

        fn on_close(&self, _: ConnectionId, direction: Direction) {
            self.closes.lock().push(direction);
        }
    }

    /// Accept one connection on a fresh listener, returning (client, accepted)
    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_reject_closes_without_dialing() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gate = Gate::new(false);
        let ctx = Arc::new(ConnectionContext {
            forward_addr: target.local_addr().unwrap(),
            callbacks: gate.clone(),
            root: CancellationToken::new(),
        });

        let (mut client, inbound) = socket_pair().await;
        ctx.handle(ConnectionId::new(1), inbound).await;

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), target.accept())
                .await
                .is_err(),
            "forward target was contacted"
        );
        assert_eq!(gate.errors.lock().len(), 1);
        assert_eq!(gate.errors.lock()[0].0, Direction::None);
        assert!(gate.closes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dial_failure_reported_upstream() {
        let refused = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let gate = Gate::new(true);
        let ctx = Arc::new(ConnectionContext {
            forward_addr: refused,
            callbacks: gate.clone(),
            root: CancellationToken::new(),
        });

        let (mut client, inbound) = socket_pair().await;
        ctx.handle(ConnectionId::new(1), inbound).await;

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        let errors = gate.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, Direction::Upstream);
        assert!(errors[0].1.contains("forward address"));
        assert!(gate.closes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_root_cancel_tears_down_connection() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gate = Gate::new(true);
        let root = CancellationToken::new();
        let ctx = Arc::new(ConnectionContext {
            forward_addr: target.local_addr().unwrap(),
            callbacks: gate.clone(),
            root: root.clone(),
        });

        let (mut client, inbound) = socket_pair().await;
        let handler = tokio::spawn(ctx.handle(ConnectionId::new(1), inbound));
        let (mut upstream_peer, _) = target.accept().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        upstream_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .expect("handler did not finish")
            .unwrap();

        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        assert_eq!(upstream_peer.read(&mut buf).await.unwrap(), 0);
        assert!(gate.errors.lock().is_empty());
        let mut closes = gate.closes.lock().clone();
        closes.sort_by_key(|d| *d as u8);
        assert_eq!(closes, vec![Direction::Upstream, Direction::Downstream]);
    }
}
