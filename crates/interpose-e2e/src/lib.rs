//! End-to-end test utilities for the interpose relay
//!
//! Starts real proxies on ephemeral ports in front of mock upstream services
//! and records every callback the proxy makes.

pub mod harness;
pub mod mock_tcp_service;
pub mod recorder;

pub use harness::TestProxy;
pub use mock_tcp_service::{MockTcpService, TcpServiceMode};
pub use recorder::{ErrorKind, Event, RecordingCallbacks};
