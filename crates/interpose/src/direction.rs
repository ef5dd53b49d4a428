use std::fmt;

/// Which way a chunk (or an error) is travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Not tied to a relay direction (accept, gate)
    None,
    /// Client to forward target
    Upstream,
    /// Forward target back to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::None => "[NONE]",
            Direction::Upstream => "[ up ]",
            Direction::Downstream => "[down]",
        };
        f.write_str(label)
    }
}

/// Identifier of one accepted connection, unique for the lifetime of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Used for events that happen before an identifier is assigned
    pub const UNASSIGNED: ConnectionId = ConnectionId(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ConnectionId> for u64 {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::None.to_string(), "[NONE]");
        assert_eq!(Direction::Upstream.to_string(), "[ up ]");
        assert_eq!(Direction::Downstream.to_string(), "[down]");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(42).to_string(), "42");
        assert_eq!(u64::from(ConnectionId::UNASSIGNED), 0);
    }
}
