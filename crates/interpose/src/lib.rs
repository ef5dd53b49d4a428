//! Transparent TCP relay with interception hooks
//!
//! A [`Proxy`] listens on one address and, for every accepted connection,
//! dials a fixed forward address and copies bytes both ways. Four hooks on
//! the [`Callbacks`] trait observe the relay: a connect gate, a per-chunk
//! receive filter that may rewrite or drop data, an error sink, and a close
//! notification.

mod callbacks;
mod connection;
mod defaults;
mod direction;
mod error;
mod forwarder;
mod proxy;
mod resolver;
mod state;

// Re-export public types
pub use callbacks::{Callbacks, Hooks};
pub use defaults::{LoggingCallbacks, PayloadPrinter};
pub use direction::{ConnectionId, Direction};
pub use error::{ConnectionError, ProxyError};
pub use forwarder::BUFFER_SIZE;
pub use proxy::Proxy;
pub use resolver::{resolve, Endpoint, Network};
pub use state::ConnectionIdGenerator;
