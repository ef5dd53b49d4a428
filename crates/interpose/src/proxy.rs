use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::callbacks::Callbacks;
use crate::connection::ConnectionContext;
use crate::defaults::LoggingCallbacks;
use crate::direction::{ConnectionId, Direction};
use crate::error::{ConnectionError, ProxyError};
use crate::resolver::{self, Endpoint, Network};
use crate::state::ConnectionIdGenerator;

/// Pause after a failed accept so a persistent failure (fd exhaustion)
/// does not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A transparent TCP relay between one listen address and one forward address
pub struct Proxy {
    network: Network,
    listen_addr: SocketAddr,
    forward_addr: SocketAddr,
    callbacks: Arc<dyn Callbacks>,
    root: CancellationToken,
    serving: AtomicBool,
}

impl Proxy {
    /// Resolve both endpoints. Fails with [`ProxyError::Resolve`] naming
    /// whichever endpoint could not be resolved.
    ///
    /// The proxy starts out with [`LoggingCallbacks`] and its own shutdown
    /// token; replace them before calling [`serve`](Self::serve).
    pub async fn new(network: Network, listen: &str, forward: &str) -> Result<Self, ProxyError> {
        let listen_addr = resolver::resolve(network, Endpoint::Listen, listen).await?;
        let forward_addr = resolver::resolve(network, Endpoint::Forward, forward).await?;

        Ok(Self {
            network,
            listen_addr,
            forward_addr,
            callbacks: Arc::new(LoggingCallbacks),
            root: CancellationToken::new(),
            serving: AtomicBool::new(false),
        })
    }

    /// Install the callback set every connection reports to
    pub fn with_callbacks(mut self, callbacks: impl Callbacks + 'static) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    /// Use `token` as the root of every connection's cancellation scope.
    /// Cancelling it stops the accept loop and tears down all connections.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.root = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn forward_addr(&self) -> SocketAddr {
        self.forward_addr
    }

    /// Bind the listen address and accept connections until the shutdown
    /// token is cancelled.
    pub async fn serve(&self) -> Result<(), ProxyError> {
        self.claim()?;

        let listener = match TcpListener::bind(self.listen_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                // Never started, so a later attempt is not a second serve
                self.serving.store(false, Ordering::SeqCst);
                return Err(ProxyError::Bind {
                    addr: self.listen_addr,
                    source,
                });
            }
        };

        self.accept_loop(listener).await;
        Ok(())
    }

    /// Run the accept loop on a listener bound by the caller
    pub async fn serve_with_listener(&self, listener: TcpListener) -> Result<(), ProxyError> {
        self.claim()?;
        self.accept_loop(listener).await;
        Ok(())
    }

    fn claim(&self) -> Result<(), ProxyError> {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::AlreadyServing);
        }
        Ok(())
    }

    async fn accept_loop(&self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!("Listening on {} -> forwarding to {}", addr, self.forward_addr),
            Err(_) => tracing::info!("Listening -> forwarding to {}", self.forward_addr),
        }

        let ctx = Arc::new(ConnectionContext {
            forward_addr: self.forward_addr,
            callbacks: self.callbacks.clone(),
            root: self.root.clone(),
        });
        let ids = ConnectionIdGenerator::new();

        loop {
            let accepted = tokio::select! {
                _ = self.root.cancelled() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let id = ids.next();
                    tracing::debug!("Connection {} accepted from {}", id, peer_addr);
                    tokio::spawn(ctx.clone().handle(id, stream));
                }
                Err(e) => {
                    if !self.accept_failed(e).await {
                        tracing::info!("Shutdown requested, no longer accepting");
                        return;
                    }
                }
            }
        }
    }

    /// Report an accept failure and back off. Returns false if shutdown was
    /// requested in the meantime.
    async fn accept_failed(&self, e: io::Error) -> bool {
        self.callbacks.on_error(
            ConnectionId::UNASSIGNED,
            Direction::None,
            &ConnectionError::Accept(e),
        );

        tokio::select! {
            _ = self.root.cancelled() => false,
            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        }
    }
}
