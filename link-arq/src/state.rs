//! Per-frame transmission state.
//!
//! Every outstanding frame in every engine walks the same small state
//! machine:
//!
//! ```text
//!            ┌──── timeout ────┐
//!            ▼                 │
//!  ──send──▶ SENT ──────▶ TIMED_OUT
//!            │     ▲           │
//!            │     └─ resend ──┘
//!            ▼
//!          ACKED
//! ```

/// Lifecycle state of one outstanding frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// On the wire (or dropped by the channel); awaiting acknowledgement.
    #[default]
    Sent,
    /// Acknowledged; the frame will never be sent again.
    Acked,
    /// The retransmission deadline passed without an acknowledgement.
    TimedOut,
}

impl FrameState {
    /// Deadline expiry. Only a `Sent` frame can time out.
    pub fn on_timeout(self) -> Self {
        match self {
            FrameState::Sent => FrameState::TimedOut,
            other => other,
        }
    }

    /// Retransmission. An acknowledged frame stays acknowledged.
    pub fn on_resend(self) -> Self {
        match self {
            FrameState::Acked => FrameState::Acked,
            _ => FrameState::Sent,
        }
    }

    pub fn is_acked(self) -> bool {
        self == FrameState::Acked
    }
}

impl std::fmt::Display for FrameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameState::Sent => f.write_str("SENT"),
            FrameState::Acked => f.write_str("ACKED"),
            FrameState::TimedOut => f.write_str("TIMED_OUT"),
        }
    }
}
