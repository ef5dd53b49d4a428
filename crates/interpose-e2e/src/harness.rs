//! Test proxy harness for E2E tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use interpose::{Network, Proxy, ProxyError};

use crate::recorder::RecordingCallbacks;

/// A running proxy instance
pub struct TestProxy {
    /// Address clients connect to
    pub addr: SocketAddr,
    /// Address the proxy forwards to
    pub forward_addr: SocketAddr,
    /// Every callback the proxy made
    pub recorder: Arc<RecordingCallbacks>,
    /// The proxy itself, for serve-twice checks
    pub proxy: Arc<Proxy>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<(), ProxyError>>>,
}

impl TestProxy {
    /// Start a proxy on an ephemeral port forwarding to `forward`
    pub async fn start(forward: SocketAddr) -> Self {
        Self::start_with(forward, RecordingCallbacks::new()).await
    }

    /// Start a proxy with a preconfigured recorder
    pub async fn start_with(forward: SocketAddr, recorder: Arc<RecordingCallbacks>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind proxy listener");
        let addr = listener.local_addr().unwrap();

        let proxy = Proxy::new(Network::Tcp, &addr.to_string(), &forward.to_string())
            .await
            .expect("Failed to create proxy")
            .with_callbacks(recorder.clone());
        let proxy = Arc::new(proxy);
        let shutdown = proxy.shutdown_token();

        let serving = proxy.clone();
        let task = tokio::spawn(async move { serving.serve_with_listener(listener).await });

        // Give the accept loop a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            forward_addr: forward,
            recorder,
            proxy,
            shutdown,
            task: Some(task),
        }
    }

    /// Open a client connection through the proxy
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to proxy")
    }

    /// Stop accepting and tear down every live connection
    pub async fn shutdown(&mut self) -> Result<(), ProxyError> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => task.await.expect("serve task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
