//! Bounded replay window for late subscribers.
//!
//! Keeps the most recent output chunks per session so a client that attaches
//! mid-run still sees recent history. Sliding window only; chunks are never
//! merged or summarized.

use bytes::Bytes;
use std::collections::VecDeque;

/// Chunks retained per session.
pub const REPLAY_CAPACITY: usize = 200;

/// Fixed-capacity, order-preserving ring of output chunks.
#[derive(Debug)]
pub struct ReplayBuffer {
    chunks: VecDeque<Bytes>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a chunk, evicting the oldest when at capacity.
    pub fn push(&mut self, chunk: Bytes) {
        if self.capacity == 0 {
            return;
        }
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
    }

    /// Copy of the buffered chunks, oldest first.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.chunks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(REPLAY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn preserves_insertion_order() {
        let mut buf = ReplayBuffer::new(10);
        buf.push(chunk("a"));
        buf.push(chunk("b"));
        buf.push(chunk("c"));
        let snap = buf.snapshot();
        assert_eq!(snap, vec![chunk("a"), chunk("b"), chunk("c")]);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut buf = ReplayBuffer::new(3);
        for s in ["1", "2", "3", "4", "5"] {
            buf.push(chunk(s));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.snapshot(), vec![chunk("3"), chunk("4"), chunk("5")]);
    }

    #[test]
    fn never_exceeds_default_capacity() {
        let mut buf = ReplayBuffer::default();
        for i in 0..500 {
            buf.push(chunk(&i.to_string()));
        }
        assert_eq!(buf.len(), REPLAY_CAPACITY);
        let snap = buf.snapshot();
        // The most recent 200 appends survive, in insertion order.
        assert_eq!(snap.first().unwrap(), &chunk("300"));
        assert_eq!(snap.last().unwrap(), &chunk("499"));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut buf = ReplayBuffer::new(0);
        buf.push(chunk("x"));
        assert!(buf.is_empty());
        assert!(buf.snapshot().is_empty());
    }
}
