//! Callback set that records everything the proxy reports

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;

use interpose::{Callbacks, ConnectionError, ConnectionId, Direction};

/// Kind of a reported error, without the underlying io::Error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Accept,
    Rejected,
    Dial,
    PeerClosed,
    Read,
    Write,
}

impl From<&ConnectionError> for ErrorKind {
    fn from(error: &ConnectionError) -> Self {
        match error {
            ConnectionError::Accept(_) => ErrorKind::Accept,
            ConnectionError::Rejected => ErrorKind::Rejected,
            ConnectionError::Dial { .. } => ErrorKind::Dial,
            ConnectionError::PeerClosed => ErrorKind::PeerClosed,
            ConnectionError::Read(_) => ErrorKind::Read,
            ConnectionError::Write(_) => ErrorKind::Write,
        }
    }
}

/// One recorded callback invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connect(u64),
    /// Chunk as read, before any rewrite
    Receive(u64, Direction, Vec<u8>),
    Error(u64, Direction, ErrorKind),
    Close(u64, Direction),
}

impl Event {
    pub fn connection_id(&self) -> u64 {
        match self {
            Event::Connect(id)
            | Event::Receive(id, _, _)
            | Event::Error(id, _, _)
            | Event::Close(id, _) => *id,
        }
    }
}

type Filter = dyn Fn(Direction, &mut BytesMut) -> bool + Send + Sync;

/// Records every callback, with a switchable connect gate and an optional
/// receive filter
pub struct RecordingCallbacks {
    events: Mutex<Vec<Event>>,
    accept: AtomicBool,
    filter: RwLock<Option<Box<Filter>>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
            filter: RwLock::new(None),
        })
    }

    /// Make the connect gate accept or reject new connections
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Install a receive filter; chunks pass unchanged without one
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(Direction, &mut BytesMut) -> bool + Send + Sync + 'static,
    {
        *self.filter.write() = Some(Box::new(filter));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events for one connection, in the order they were reported
    pub fn events_for(&self, id: u64) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.connection_id() == id)
            .cloned()
            .collect()
    }

    /// Connection ids seen by the connect gate, in call order
    pub fn connected_ids(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Connect(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Poll until `pred` holds for the recorded events, or give up after `timeout`
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&[Event]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pred(self.events.lock().as_slice()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn push(&self, event: Event) {
        tracing::debug!("Recorded {:?}", event);
        self.events.lock().push(event);
    }
}

impl Callbacks for RecordingCallbacks {
    fn on_connect(&self, id: ConnectionId, _stream: &TcpStream) -> bool {
        self.push(Event::Connect(id.get()));
        self.accept.load(Ordering::SeqCst)
    }

    fn on_receive(&self, id: ConnectionId, direction: Direction, chunk: &mut BytesMut) -> bool {
        self.push(Event::Receive(id.get(), direction, chunk.to_vec()));
        match &*self.filter.read() {
            Some(filter) => filter(direction, chunk),
            None => true,
        }
    }

    fn on_error(&self, id: ConnectionId, direction: Direction, error: &ConnectionError) {
        self.push(Event::Error(id.get(), direction, error.into()));
    }

    fn on_close(&self, id: ConnectionId, direction: Direction) {
        self.push(Event::Close(id.get(), direction));
    }
}
