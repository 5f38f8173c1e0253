//! Inbound frame state for stop-and-wait reliability.
//!
//! [`Receiver`] keeps the single sequence number it expects next. A frame
//! whose CRC already verified is classified as:
//! - **Deliver**: `seq == expected`: hand the payload to the sink, ACK it,
//!   and advance `expected`.
//! - **Duplicate**: `seq == expected - 1`: the ACK for the previous frame was
//!   lost or corrupted. Re-ACK it, deliver nothing.
//! - **Discard**: anything else: drop silently; the sender times out.
//!
//! Frames that fail the CRC never reach this module. The caller drops them
//! without an acknowledgement.

/// What the caller should do with a verified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver the payload and ACK `seq`.
    Deliver,
    /// Re-ACK `seq` without delivering.
    Duplicate,
    /// Drop without acknowledgement.
    Discard,
}

/// Stop-and-wait receive-side state.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Next expected sequence number.
    pub expected: u8,
}

impl Receiver {
    pub fn new(expected: u8) -> Self {
        Self { expected }
    }

    /// Classify a frame that passed the CRC check.
    pub fn on_frame(&mut self, seq: u8) -> Verdict {
        if seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            Verdict::Deliver
        } else if seq == self.expected.wrapping_sub(1) {
            Verdict::Duplicate
        } else {
            Verdict::Discard
        }
    }
}
