//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight frames.
//! Unlike stop-and-wait, multiple frames may be outstanding simultaneously.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once.
//! - ACKs are **cumulative**: `ACK(a)` means the receiver has accepted every
//!   frame before sequence number `a` and expects `a` next.
//! - On timeout, the caller retransmits **all** cached frames from `base`
//!   onwards (go back to N).
//! - Sequence numbers are u8 and wrap around; `window_size ≤ 128` keeps the
//!   modular comparisons unambiguous.
//!
//! This module only manages state; all transport I/O is the caller's
//! responsibility.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::window::{seq_distance, Window, MAX_WINDOW};

// ---------------------------------------------------------------------------
// GbnEntry
// ---------------------------------------------------------------------------

/// A single in-flight frame occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    pub seq: u8,
    /// The serialised frame (ready to hand to the link).
    pub wire: Vec<u8>,
    /// Total number of times this frame has been transmitted.
    pub tx_count: u32,
    /// Time of the most recent transmission (for RTT sampling).
    pub sent_at: Instant,
}

/// Result of feeding a cumulative ACK to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// Frames retired by this ACK; `0` for a stale or out-of-range ACK.
    pub acked: usize,
    /// Round-trip sample from the newest retired frame, if it was never
    /// retransmitted.
    pub rtt_sample: Option<Duration>,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state.
///
/// # Sequence-number layout
///
/// ```text
///    base             next_seq        base + N
///      │                  │               │
///  ────┼──────────────────┼───────────────┼──▶ seq space (mod 256)
///      │ <── in flight ──▶│ <── usable ──▶│
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked frame (left window edge).
    pub base: u8,

    /// Sequence number to use for the **next** new frame.
    pub next_seq: u8,

    /// Maximum number of frames that may be in flight simultaneously (N).
    window_size: usize,

    /// In-flight frames ordered by sequence number (front = oldest).
    window: VecDeque<GbnEntry>,
}

impl GbnSender {
    /// Create a new [`GbnSender`] whose first frame carries `first_seq`.
    pub fn new(first_seq: u8, window_size: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&window_size),
            "window_size must be in 1..={MAX_WINDOW}"
        );
        Self {
            base: first_seq,
            next_seq: first_seq,
            window_size,
            window: VecDeque::with_capacity(window_size),
        }
    }

    /// `true` while `next_seq` lies in `[base, base + N)`.
    pub fn can_send(&self) -> bool {
        Window::new(self.base, self.window_size).contains(self.next_seq)
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// `true` when at least one frame is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// Cache a just-transmitted frame under `next_seq` and advance `next_seq`.
    pub fn record_sent(&mut self, wire: Vec<u8>, now: Instant) {
        debug_assert!(
            self.can_send(),
            "record_sent called on a full GBN window ({} / {})",
            self.window.len(),
            self.window_size
        );
        self.window.push_back(GbnEntry {
            seq: self.next_seq,
            wire,
            tx_count: 1,
            sent_at: now,
        });
        self.next_seq = self.next_seq.wrapping_add(1);
    }

    /// Process a cumulative ACK carrying the receiver's next expected `ack`.
    ///
    /// Accepted only when `0 < (ack - base) mod 256 ≤ in_flight`; anything
    /// else is stale or refers to frames never sent and is ignored.
    pub fn on_ack(&mut self, ack: u8, now: Instant) -> AckOutcome {
        let advance = seq_distance(ack, self.base);
        if advance == 0 || advance > self.window.len() {
            return AckOutcome {
                acked: 0,
                rtt_sample: None,
            };
        }

        let mut newest = None;
        for entry in self.window.drain(..advance) {
            newest = Some(entry);
        }
        self.base = ack;

        let rtt_sample = newest
            .filter(|e| e.tx_count == 1)
            .map(|e| now.saturating_duration_since(e.sent_at));
        AckOutcome {
            acked: advance,
            rtt_sample,
        }
    }

    /// Iterate over all in-flight frames from oldest to newest.
    ///
    /// Used by the connection layer to retransmit all unacked frames on
    /// timeout (the "go back N" step).
    pub fn window_entries(&self) -> impl Iterator<Item = &GbnEntry> {
        self.window.iter()
    }

    /// Increment the transmission count and refresh `sent_at` for every
    /// in-flight frame.
    ///
    /// Call this immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self, now: Instant) {
        for entry in self.window.iter_mut() {
            entry.tx_count += 1;
            entry.sent_at = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
