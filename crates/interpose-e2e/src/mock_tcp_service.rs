//! Mock upstream TCP service for E2E tests
//!
//! Stands in for the forward target: echoes, answers with a fixed greeting,
//! or silently accumulates, and records what each connection delivered.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Behavior mode for the mock TCP service
#[derive(Clone, Debug)]
pub enum TcpServiceMode {
    /// Echo back all received data
    Echo,
    /// Send a greeting as soon as the connection opens, then behave like Accumulate
    Greeting(Vec<u8>),
    /// Read until EOF without ever writing
    Accumulate,
}

/// A finished upstream connection
#[derive(Clone, Debug)]
pub struct RecordedTcpConnection {
    /// All data received on this connection
    pub received_data: Vec<u8>,
    /// Peer address (the proxy's outbound socket)
    pub peer_addr: SocketAddr,
}

pub struct MockTcpService {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    /// Connections recorded once the proxy side closed them
    connections: Arc<RwLock<Vec<RecordedTcpConnection>>>,
    shutdown: CancellationToken,
}

impl MockTcpService {
    /// Start an echo service on an ephemeral port
    pub async fn start() -> Self {
        Self::start_with_mode(TcpServiceMode::Echo).await
    }

    pub async fn start_with_mode(mode: TcpServiceMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock TCP service");
        let addr = listener.local_addr().unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let connections: Arc<RwLock<Vec<RecordedTcpConnection>>> = Arc::new(RwLock::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let accepted_clone = accepted.clone();
        let connections_clone = connections.clone();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_clone.cancelled() => {
                        tracing::debug!("Mock TCP service shutting down");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                accepted_clone.fetch_add(1, Ordering::SeqCst);
                                let connections = connections_clone.clone();
                                let mode = mode.clone();
                                tokio::spawn(async move {
                                    handle_connection(stream, peer_addr, connections, mode).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!("Mock TCP accept error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            accepted,
            connections,
            shutdown,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections accepted so far, finished or not
    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections that have seen EOF or an error
    pub fn get_connections(&self) -> Vec<RecordedTcpConnection> {
        self.connections.read().clone()
    }

    pub fn closed_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl Drop for MockTcpService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    connections: Arc<RwLock<Vec<RecordedTcpConnection>>>,
    mode: TcpServiceMode,
) {
    let mut received_data = Vec::new();
    let mut buf = [0u8; 4096];

    let echo = matches!(mode, TcpServiceMode::Echo);
    if let TcpServiceMode::Greeting(greeting) = &mode {
        if let Err(e) = stream.write_all(greeting).await {
            tracing::error!("Greeting write error: {}", e);
        }
    }

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                received_data.extend_from_slice(&buf[..n]);
                if echo {
                    if let Err(e) = stream.write_all(&buf[..n]).await {
                        tracing::error!("Echo write error: {}", e);
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Mock read error: {}", e);
                break;
            }
        }
    }

    connections.write().push(RecordedTcpConnection {
        received_data,
        peer_addr,
    });
}
