use std::sync::atomic::{AtomicU64, Ordering};

use crate::direction::ConnectionId;

/// Connection identifier sequence, owned by the accept loop.
/// Hands out 1, 2, 3, ... and never repeats.
pub struct ConnectionIdGenerator {
    counter: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> ConnectionId {
        ConnectionId::new(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_starts_at_one() {
        let ids = ConnectionIdGenerator::new();
        assert_eq!(ids.next().get(), 1);
        assert_eq!(ids.next().get(), 2);
        assert_eq!(ids.next().get(), 3);
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(ConnectionIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next().get()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 800);
        assert!(seen.iter().all(|id| (1..=800).contains(id)));
    }
}
