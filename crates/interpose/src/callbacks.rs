//! Interception hooks
//!
//! The proxy calls exactly these four methods and nothing else; it never
//! checks whether a hook is "installed". Embedders that only care about some
//! of the hooks use [`Hooks`], which fills the gaps with [`LoggingCallbacks`].

use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::TcpStream;

use crate::defaults::LoggingCallbacks;
use crate::direction::{ConnectionId, Direction};
use crate::error::ConnectionError;

/// Observer of every connection the proxy relays.
///
/// All methods run inline on the connection's tasks, so they should return
/// quickly. A slow `on_receive` stalls that direction of the relay.
pub trait Callbacks: Send + Sync {
    /// Decide whether to relay a freshly accepted connection.
    /// Returning `false` closes it without contacting the forward address.
    fn on_connect(&self, id: ConnectionId, stream: &TcpStream) -> bool;

    /// Inspect one chunk read from `direction`'s source.
    ///
    /// `chunk` holds exactly the bytes that were read. It may be rewritten,
    /// grown or truncated; whatever it holds when this returns `true` is
    /// written to the sink. Returning `false` drops the chunk and the relay
    /// keeps reading.
    fn on_receive(&self, id: ConnectionId, direction: Direction, chunk: &mut BytesMut) -> bool;

    /// Notification of a per-connection failure
    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError);

    /// One direction of a connection has stopped relaying
    fn on_close(&self, id: ConnectionId, direction: Direction);
}

impl<T: Callbacks + ?Sized> Callbacks for Arc<T> {
    fn on_connect(&self, id: ConnectionId, stream: &TcpStream) -> bool {
        (**self).on_connect(id, stream)
    }

    fn on_receive(&self, id: ConnectionId, direction: Direction, chunk: &mut BytesMut) -> bool {
        (**self).on_receive(id, direction, chunk)
    }

    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError) {
        (**self).on_error(id, direction, error)
    }

    fn on_close(&self, id: ConnectionId, direction: Direction) {
        (**self).on_close(id, direction)
    }
}

type ConnectFn = dyn Fn(ConnectionId, &TcpStream) -> bool + Send + Sync;
type ReceiveFn = dyn Fn(ConnectionId, Direction, &mut BytesMut) -> bool + Send + Sync;
type ErrorFn = dyn Fn(ConnectionId, Direction, &ConnectionError) + Send + Sync;
type CloseFn = dyn Fn(ConnectionId, Direction) + Send + Sync;

/// Closure-based callback set. Any hook left unset is served by the
/// fallback, which defaults to [`LoggingCallbacks`].
///
/// ```rust,ignore
/// let hooks = Hooks::new().on_receive(|_, _, chunk| {
///     chunk.make_ascii_uppercase();
///     true
/// });
/// let proxy = Proxy::new(Network::Tcp, ":9997", "example.com:80")
///     .await?
///     .with_callbacks(hooks);
/// ```
pub struct Hooks {
    on_connect: Option<Box<ConnectFn>>,
    on_receive: Option<Box<ReceiveFn>>,
    on_error: Option<Box<ErrorFn>>,
    on_close: Option<Box<CloseFn>>,
    fallback: Arc<dyn Callbacks>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::with_fallback(LoggingCallbacks)
    }

    /// Use `fallback` for every hook not set explicitly
    pub fn with_fallback(fallback: impl Callbacks + 'static) -> Self {
        Self {
            on_connect: None,
            on_receive: None,
            on_error: None,
            on_close: None,
            fallback: Arc::new(fallback),
        }
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, &TcpStream) -> bool + Send + Sync + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_receive<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, Direction, &mut BytesMut) -> bool + Send + Sync + 'static,
    {
        self.on_receive = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, Direction, &ConnectionError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionId, Direction) + Send + Sync + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

impl Callbacks for Hooks {
    fn on_connect(&self, id: ConnectionId, stream: &TcpStream) -> bool {
        match &self.on_connect {
            Some(f) => f(id, stream),
            None => self.fallback.on_connect(id, stream),
        }
    }

    fn on_receive(&self, id: ConnectionId, direction: Direction, chunk: &mut BytesMut) -> bool {
        match &self.on_receive {
            Some(f) => f(id, direction, chunk),
            None => self.fallback.on_receive(id, direction, chunk),
        }
    }

    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError) {
        match &self.on_error {
            Some(f) => f(id, direction, error),
            None => self.fallback.on_error(id, direction, error),
        }
    }

    fn on_close(&self, id: ConnectionId, direction: Direction) {
        match &self.on_close {
            Some(f) => f(id, direction),
            None => self.fallback.on_close(id, direction),
        }
    }
}
