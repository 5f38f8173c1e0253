//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** frames are accepted (seq == `expected`).
//! - Out-of-order, duplicate and corrupt frames are **silently discarded**.
//! - After every frame (accepted or not) the caller should send a
//!   **cumulative ACK** carrying [`GbnReceiver::ack_number`], the sequence
//!   number the receiver expects next. A repeated ACK of an unchanged value is
//!   what eventually makes the sender go back.
//!
//! This module only manages state; all transport I/O is the caller's
//! responsibility (same pattern as [`crate::receiver::Receiver`]).

/// Go-Back-N receive-side state for one session.
#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next expected sequence number.
    pub expected: u8,
}

impl GbnReceiver {
    /// Create a new [`GbnReceiver`] expecting `expected` first.
    pub fn new(expected: u8) -> Self {
        Self { expected }
    }

    /// Process a frame that passed the CRC check.
    ///
    /// Returns `true` if the frame was **accepted** and its payload should be
    /// delivered. Returns `false` for an out-of-order or duplicate frame;
    /// GBN discards both without buffering.
    pub fn on_frame(&mut self, seq: u8) -> bool {
        if seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            true
        } else {
            false
        }
    }

    /// Cumulative ACK number to send back: "everything before this arrived".
    pub fn ack_number(&self) -> u8 {
        self.expected
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
