//! FIFO cache of pending conditional-branch outcomes.
//!
//! Packets arrive out of step with the walker's consumption: a single LTNT
//! packet can carry up to 47 bits while the walker drains one bit per
//! conditional branch. This cache absorbs that mismatch.

use std::collections::VecDeque;

/// Result of [`TntCache::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TntPop {
    /// The oldest pending bit says the branch was taken.
    Taken,
    /// The oldest pending bit says the branch was not taken.
    NotTaken,
    /// No pending bits; the walker has run ahead of the packet stream.
    Empty,
}

/// FIFO queue of taken/not-taken outcomes.
#[derive(Default)]
pub struct TntCache {
    bits: VecDeque<bool>,
}

impl TntCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: VecDeque::new(),
        }
    }

    /// Push a single outcome (`true` = taken).
    pub fn push_bit(&mut self, taken: bool) {
        self.bits.push_back(taken);
    }

    /// Push `count` outcomes read from `value`, high bit first.
    ///
    /// This matches how short/long TNT packets encode their payload: the bit
    /// nearest the packet's stop marker (bit `count - 1` of `value`, once the
    /// packet's own prefix bits have been shifted out) is the earliest branch
    /// outcome and is pushed first; bit 0 is the most recent and is pushed
    /// last. The stop bit itself (at `count`) is not pushed.
    pub fn push_bits(&mut self, value: u64, count: u32) {
        for i in (0..count).rev() {
            self.push_bit((value >> i) & 1 != 0);
        }
    }

    /// Pop the oldest outcome.
    pub fn pop(&mut self) -> TntPop {
        match self.bits.pop_front() {
            Some(true) => TntPop::Taken,
            Some(false) => TntPop::NotTaken,
            None => TntPop::Empty,
        }
    }

    /// Number of pending bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.len()
    }

    /// Drop all pending bits, e.g. on a PSB resynchronization.
    pub fn destroy(&mut self) {
        self.bits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_bit_pop_is_fifo() {
        let mut cache = TntCache::new();
        cache.push_bit(true);
        cache.push_bit(false);
        assert_eq!(cache.pop(), TntPop::Taken);
        assert_eq!(cache.pop(), TntPop::NotTaken);
        assert_eq!(cache.pop(), TntPop::Empty);
    }

    #[test]
    fn push_bits_reads_msb_first() {
        let mut cache = TntCache::new();
        // 0b011 with count 3: bit2=0 (not taken, nearest the stop marker,
        // pushed first), bit1=1 (taken), bit0=1 (taken, most recent).
        cache.push_bits(0b011, 3);
        assert_eq!(cache.count(), 3);
        assert_eq!(cache.pop(), TntPop::NotTaken);
        assert_eq!(cache.pop(), TntPop::Taken);
        assert_eq!(cache.pop(), TntPop::Taken);
    }

    #[test]
    fn destroy_drops_pending_bits() {
        let mut cache = TntCache::new();
        cache.push_bits(0xFF, 8);
        cache.destroy();
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.pop(), TntPop::Empty);
    }
}
