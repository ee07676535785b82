// src/io/serial/coalescer.rs
//
// Timing-based coalescing of a raw serial byte stream into display units.
// The link carries no framing, so bytes are grouped by arrival gaps:
// a gap of at least `gap` since the previous byte, or reaching `max_len`
// bytes, closes the current group.

use std::time::{Duration, Instant};

use crate::settings::MAX_MESSAGE_LEN;

/// Groups consecutively-arriving bytes into chunks.
#[derive(Debug)]
pub struct Coalescer {
    buffer: Vec<u8>,
    last_byte_at: Option<Instant>,
    gap: Duration,
    max_len: usize,
}

impl Coalescer {
    pub fn new(gap: Duration, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Coalescer {
            buffer: Vec::with_capacity(max_len.min(MAX_MESSAGE_LEN)),
            last_byte_at: None,
            gap,
            max_len,
        }
    }

    fn gap_elapsed(&self, now: Instant) -> bool {
        self.last_byte_at
            .map(|last| now.saturating_duration_since(last) >= self.gap)
            .unwrap_or(false)
    }

    /// Feed bytes that arrived together at `at`.
    /// Returns every chunk completed by this arrival, oldest first.
    pub fn feed(&mut self, data: &[u8], at: Instant) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();

        if !self.buffer.is_empty() && self.gap_elapsed(at) {
            chunks.push(std::mem::take(&mut self.buffer));
        }

        for &byte in data {
            self.buffer.push(byte);

            // Force split at the size cap
            if self.buffer.len() >= self.max_len {
                chunks.push(std::mem::take(&mut self.buffer));
            }
        }

        if !data.is_empty() {
            self.last_byte_at = Some(at);
        }
        chunks
    }

    /// Close the pending chunk if the line has been idle for at least the gap.
    /// Called after a read timeout so quiet links still get their last chunk shown.
    pub fn poll_idle(&mut self, now: Instant) -> Option<Vec<u8>> {
        if !self.buffer.is_empty() && self.gap_elapsed(now) {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Flush whatever is buffered, regardless of timing. Call when the stream ends.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_gap_splits_messages() {
        let t0 = Instant::now();
        let mut c = Coalescer::new(ms(20), 16);

        assert!(c.feed(&[0x01], t0).is_empty());
        assert!(c.feed(&[0x02], t0 + ms(2)).is_empty());

        let chunks = c.feed(&[0x03], t0 + ms(100));
        assert_eq!(chunks, vec![vec![0x01, 0x02]]);
        assert_eq!(c.flush(), Some(vec![0x03]));
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn test_gap_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut c = Coalescer::new(ms(20), 16);

        c.feed(&[0xAA], t0);
        assert!(c.feed(&[0xBB], t0 + ms(19)).is_empty());
        assert_eq!(c.feed(&[0xCC], t0 + ms(39)), vec![vec![0xAA, 0xBB]]);
    }

    #[test]
    fn test_size_cap_splits() {
        let t0 = Instant::now();
        let mut c = Coalescer::new(ms(20), 4);

        let chunks = c.feed(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], t0);
        assert_eq!(chunks, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(c.flush(), Some(vec![9, 10]));
    }

    #[test]
    fn test_poll_idle() {
        let t0 = Instant::now();
        let mut c = Coalescer::new(ms(20), 16);

        assert_eq!(c.poll_idle(t0), None);
        c.feed(&[0x10, 0x11], t0);
        assert_eq!(c.poll_idle(t0 + ms(5)), None);
        assert_eq!(c.poll_idle(t0 + ms(25)), Some(vec![0x10, 0x11]));
        assert!(c.is_empty());
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        let mut c = Coalescer::new(ms(20), 0);
        let chunks = c.feed(&[7, 8], Instant::now());
        assert_eq!(chunks, vec![vec![7], vec![8]]);
    }
}
