//! Sequence-number arithmetic modulo `MAX_SEQ + 1`.

use crate::error::{LinkError, Result};

/// A sequence space of `2^bits` numbers with a window of half that size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    max_seq: u8,
}

impl SeqSpace {
    pub fn new(bits: u8) -> Result<Self> {
        if !(1..=8).contains(&bits) {
            return Err(LinkError::InvalidConfig(format!(
                "seq_bits must be within 1..=8, got {bits}"
            )));
        }
        let max_seq = ((1u16 << bits) - 1) as u8;
        Ok(Self { max_seq })
    }

    pub fn max_seq(&self) -> u8 {
        self.max_seq
    }

    /// Number of distinct sequence numbers.
    pub fn modulus(&self) -> u16 {
        self.max_seq as u16 + 1
    }

    /// Window size W, used both for sender buffering and receiver slots.
    pub fn window(&self) -> usize {
        self.modulus() as usize / 2
    }

    /// Buffer/timer slot owned by `seq`.
    pub fn slot(&self, seq: u8) -> usize {
        seq as usize % self.window()
    }

    pub fn increment(&self, seq: u8) -> u8 {
        if seq < self.max_seq { seq + 1 } else { 0 }
    }

    pub fn decrement(&self, seq: u8) -> u8 {
        if seq == 0 { self.max_seq } else { seq - 1 }
    }

    /// Circular distance from `low` forward to `high`.
    pub fn distance(&self, low: u8, high: u8) -> usize {
        ((high as u16 + self.modulus() - low as u16) % self.modulus()) as usize
    }

    /// True iff `x` lies in the circular interval `[low, high)`.
    pub fn in_window(&self, low: u8, x: u8, high: u8) -> bool {
        (low <= x && x < high) || (high < low && low <= x) || (x < high && high < low)
    }
}

impl Default for SeqSpace {
    fn default() -> Self {
        Self { max_seq: 15 }
    }
}
