//! Selective-Repeat receive-side state machine.
//!
//! The receiver accepts any valid frame inside `[base, base + N)`, buffers it,
//! and acknowledges it individually. Buffered frames are released to the sink
//! only as a contiguous run starting at `base`, so delivery is strictly in
//! order no matter how frames arrive.
//!
//! | Frame                         | Reply       | Effect                     |
//! |-------------------------------|-------------|----------------------------|
//! | CRC failure                   | `NAK(base)` | none                       |
//! | `seq` precedes `base`         | `ACK(seq)`  | none (already delivered)   |
//! | `seq ≥ base + N`              | none        | dropped                    |
//! | otherwise                     | `ACK(seq)`  | buffered, run delivered    |

use std::collections::BTreeMap;

use crate::frame::Ack;
use crate::window::{seq_distance, seq_offset, MAX_WINDOW};

/// Result of handing one verified frame to the receiver.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SrDelivery {
    /// Acknowledgement to send, if any.
    pub reply: Option<Ack>,
    /// Payloads now deliverable, in sequence order.
    pub delivered: Vec<Vec<u8>>,
    /// The frame had already been delivered or buffered.
    pub duplicate: bool,
}

/// Selective-Repeat receive-side state.
#[derive(Debug)]
pub struct SrReceiver {
    /// Oldest sequence number not yet delivered.
    pub base: u8,
    window_size: usize,
    /// Out-of-order frames keyed by sequence number.
    buffer: BTreeMap<u8, Vec<u8>>,
}

impl SrReceiver {
    pub fn new(base: u8, window_size: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&window_size),
            "window_size must be in 1..={MAX_WINDOW}"
        );
        Self {
            base,
            window_size,
            buffer: BTreeMap::new(),
        }
    }

    /// Reply for a frame that failed the integrity check.
    pub fn on_corrupt(&self) -> Ack {
        Ack::nak(self.base)
    }

    /// Process a frame that passed the CRC check.
    pub fn on_frame(&mut self, seq: u8, payload: Vec<u8>) -> SrDelivery {
        if seq_offset(seq, self.base) < 0 {
            return SrDelivery {
                reply: Some(Ack::ack(seq)),
                delivered: Vec::new(),
                duplicate: true,
            };
        }
        if seq_distance(seq, self.base) >= self.window_size {
            return SrDelivery::default();
        }

        let duplicate = self.buffer.contains_key(&seq);
        if !duplicate {
            self.buffer.insert(seq, payload);
        }

        let mut delivered = Vec::new();
        while let Some(p) = self.buffer.remove(&self.base) {
            delivered.push(p);
            self.base = self.base.wrapping_add(1);
        }
        SrDelivery {
            reply: Some(Ack::ack(seq)),
            delivered,
            duplicate,
        }
    }

    /// Frames held back waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
