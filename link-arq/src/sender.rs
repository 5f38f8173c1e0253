//! Outbound frame state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the sequence number and the single in-flight frame.
//! It does **not** touch the transport; [`crate::connection`] calls these
//! methods and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** frame is in flight at any moment (`unacked`).
//! - A new frame may only be sent once `unacked` is `None`.
//! - On a matching ACK: `next_seq` advances by one (mod 256); `unacked` clears.
//! - On timeout: the identical bytes are resent; there is no retry cap here.

use std::time::Duration;

use tokio::time::Instant;

use crate::state::FrameState;

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// A frame that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// Sequence number carried by the frame.
    pub seq: u8,
    /// Serialised bytes, exactly as first built (before any channel faults).
    pub wire: Vec<u8>,
    /// How many times this frame has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    pub state: FrameState,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state.
#[derive(Debug, Default)]
pub struct Sender {
    /// Sequence number of the **next** frame to build.
    ///
    /// Remains unchanged while a frame is in flight.
    pub next_seq: u8,

    /// The in-flight frame, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,
}

impl Sender {
    pub fn new(first_seq: u8) -> Self {
        Self {
            next_seq: first_seq,
            unacked: None,
        }
    }

    /// Move `wire` into the in-flight slot (first transmission).
    pub fn record_sent(&mut self, wire: Vec<u8>, now: Instant) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while a frame is already in flight"
        );
        self.unacked = Some(RetransmitEntry {
            seq: self.next_seq,
            wire,
            tx_count: 1,
            sent_at: now,
            state: FrameState::Sent,
        });
    }

    /// Process an inbound ACK for `seq`.
    ///
    /// Returns `None` for an ACK that does not match the in-flight frame.
    /// Otherwise the slot is cleared, `next_seq` advances, and the result
    /// carries an RTT sample when the frame was sent exactly once.
    pub fn on_ack(&mut self, seq: u8, now: Instant) -> Option<Option<Duration>> {
        let entry = self.unacked.as_ref()?;
        if entry.seq != seq {
            return None;
        }
        let sample = (entry.tx_count == 1).then(|| now.saturating_duration_since(entry.sent_at));
        self.unacked = None;
        self.next_seq = seq.wrapping_add(1);
        Some(sample)
    }

    /// Mark the in-flight frame timed out and return its bytes for resending.
    pub fn on_timeout(&mut self) -> Option<&[u8]> {
        let entry = self.unacked.as_mut()?;
        entry.state = entry.state.on_timeout();
        Some(&entry.wire)
    }

    /// Bookkeeping after the in-flight frame was resent.
    pub fn on_retransmit(&mut self, now: Instant) {
        if let Some(ref mut e) = self.unacked {
            e.tx_count += 1;
            e.sent_at = now;
            e.state = e.state.on_resend();
        }
    }

    /// Number of transmissions of the in-flight frame, `0` when idle.
    pub fn tx_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// `true` when a frame is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }
}
