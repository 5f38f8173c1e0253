//! Selective-Repeat send-side state machine.
//!
//! Like Go-Back-N, up to `N` frames may be in flight. The differences:
//!
//! - ACKs are **per frame**: `ACK(s)` acknowledges frame `s` alone.
//! - Every slot carries its **own deadline**; expiry resends only that slot.
//! - `NAK(s)` asks for an immediate resend of frame `s`.
//! - `base` only slides past a *contiguous* run of acknowledged slots, so
//!   sequence numbers retire in order even when ACKs arrive out of order.
//!
//! ```text
//!   base                       next_seq
//!    │ ACKED? │ ACKED │ SENT │ ...  │
//!    └────────┴───────┴──────┴──────┘ slots (front = base)
//! ```
//!
//! State only; the I/O loop lives in [`crate::sr_connection`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::state::FrameState;
use crate::window::{seq_distance, MAX_WINDOW};

/// One cached in-flight frame.
#[derive(Debug, Clone)]
pub struct Slot {
    pub seq: u8,
    pub wire: Vec<u8>,
    pub state: FrameState,
    /// When this slot is due for retransmission.
    pub deadline: Instant,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    pub tx_count: u32,
}

/// How an ACK was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrAck {
    /// The slot was newly acknowledged.
    Accepted {
        /// RTT sample, present only for frames sent exactly once.
        rtt_sample: Option<Duration>,
        /// Slots retired from the front of the window by this ACK.
        retired: usize,
    },
    /// Outside the window, or already acknowledged.
    Ignored,
}

/// Selective-Repeat send-side state.
#[derive(Debug)]
pub struct SrSender {
    /// Sequence number of the oldest unretired slot.
    pub base: u8,
    /// Sequence number for the next new frame.
    pub next_seq: u8,
    window_size: usize,
    /// `slots[i]` holds sequence `base + i`.
    slots: VecDeque<Slot>,
}

impl SrSender {
    pub fn new(first_seq: u8, window_size: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&window_size),
            "window_size must be in 1..={MAX_WINDOW}"
        );
        Self {
            base: first_seq,
            next_seq: first_seq,
            window_size,
            slots: VecDeque::with_capacity(window_size),
        }
    }

    /// `true` while an empty slot remains in `[base, base + N)`.
    pub fn can_send(&self) -> bool {
        self.slots.len() < self.window_size
    }

    /// `true` when no slot is awaiting acknowledgement.
    pub fn is_idle(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Cache a just-transmitted frame under `next_seq`, due at `now + rto`.
    pub fn push(&mut self, wire: Vec<u8>, now: Instant, rto: Duration) -> u8 {
        debug_assert!(self.can_send(), "push called on a full SR window");
        let seq = self.next_seq;
        self.slots.push_back(Slot {
            seq,
            wire,
            state: FrameState::Sent,
            deadline: now + rto,
            sent_at: now,
            tx_count: 1,
        });
        self.next_seq = seq.wrapping_add(1);
        seq
    }

    fn slot_index(&self, seq: u8) -> Option<usize> {
        let idx = seq_distance(seq, self.base);
        (idx < self.slots.len()).then_some(idx)
    }

    /// Mark `seq` acknowledged and slide `base` past the contiguous acked run.
    pub fn on_ack(&mut self, seq: u8, now: Instant) -> SrAck {
        let Some(idx) = self.slot_index(seq) else {
            return SrAck::Ignored;
        };
        let slot = &mut self.slots[idx];
        if slot.state.is_acked() {
            return SrAck::Ignored;
        }
        slot.state = FrameState::Acked;
        let rtt_sample =
            (slot.tx_count == 1).then(|| now.saturating_duration_since(slot.sent_at));

        let mut retired = 0;
        while self.slots.front().is_some_and(|s| s.state.is_acked()) {
            self.slots.pop_front();
            self.base = self.base.wrapping_add(1);
            retired += 1;
        }
        SrAck::Accepted {
            rtt_sample,
            retired,
        }
    }

    /// Cached bytes for a NAKed frame that is still outstanding.
    pub fn on_nak(&self, seq: u8) -> Option<&[u8]> {
        let slot = &self.slots[self.slot_index(seq)?];
        (!slot.state.is_acked()).then_some(slot.wire.as_slice())
    }

    /// Sequence numbers of unacknowledged slots whose deadline has passed.
    ///
    /// Each returned slot is moved to [`FrameState::TimedOut`].
    pub fn expired(&mut self, now: Instant) -> Vec<u8> {
        let mut due = Vec::new();
        for slot in self.slots.iter_mut() {
            if !slot.state.is_acked() && slot.deadline <= now {
                slot.state = slot.state.on_timeout();
                due.push(slot.seq);
            }
        }
        due
    }

    /// Cached bytes for an outstanding slot.
    pub fn wire(&self, seq: u8) -> Option<&[u8]> {
        self.slot_index(seq).map(|i| self.slots[i].wire.as_slice())
    }

    /// Bookkeeping after `seq` was resent: bump the count, re-arm the deadline.
    pub fn mark_resent(&mut self, seq: u8, now: Instant, rto: Duration) {
        if let Some(idx) = self.slot_index(seq) {
            let slot = &mut self.slots[idx];
            slot.state = slot.state.on_resend();
            slot.tx_count += 1;
            slot.sent_at = now;
            slot.deadline = now + rto;
        }
    }

    pub fn tx_count(&self, seq: u8) -> u32 {
        self.slot_index(seq).map_or(0, |i| self.slots[i].tx_count)
    }
}
