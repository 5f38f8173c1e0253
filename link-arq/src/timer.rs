//! Adaptive retransmission timeout.
//!
//! Reliable delivery requires that unacknowledged frames are re-sent if no
//! acknowledgement arrives within a bounded time. [`RttEstimator`] keeps the
//! smoothed round-trip time and its variation (Jacobson/Karels):
//!
//! ```text
//! first sample:  SRTT = R,  RTTVAR = R/2
//! thereafter:    RTTVAR = 3/4·RTTVAR + 1/4·|SRTT − R|
//!                SRTT   = 7/8·SRTT   + 1/8·R
//! RTO = clamp(SRTT + 4·RTTVAR, MIN_RTO, MAX_RTO)
//! ```
//!
//! On a timeout only the RTO is scaled by a back-off factor; SRTT and RTTVAR
//! stay untouched. Samples taken from retransmitted frames are ambiguous and
//! must never be passed to [`RttEstimator::observe`] (Karn's algorithm).

use std::time::Duration;

/// Lower bound for the retransmission timeout.
pub const MIN_RTO: Duration = Duration::from_millis(200);
/// Upper bound for the retransmission timeout.
pub const MAX_RTO: Duration = Duration::from_millis(4000);
/// RTO used before the first sample.
pub const DEFAULT_INITIAL_RTO: Duration = Duration::from_millis(1000);

/// Smoothed RTT / RTT variance / RTO state for one engine.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT estimate (SRTT).
    srtt: Option<Duration>,
    /// RTT variance estimate (RTTVAR).
    rttvar: Option<Duration>,
    /// Current retransmission timeout.
    rto: Duration,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_RTO)
    }
}

impl RttEstimator {
    /// Create an estimator whose RTO starts at `initial_rto` (clamped).
    pub fn new(initial_rto: Duration) -> Self {
        Self {
            srtt: None,
            rttvar: None,
            rto: clamp_rto(initial_rto),
        }
    }

    /// Record a new RTT sample and update SRTT / RTTVAR / RTO.
    pub fn observe(&mut self, sample: Duration) {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let diff = sample.abs_diff(srtt);
                self.rttvar = Some(rttvar * 3 / 4 + diff / 4);
                self.srtt = Some(srtt * 7 / 8 + sample / 8);
            }
            _ => {
                self.srtt = Some(sample);
                self.rttvar = Some(sample / 2);
            }
        }
        if let (Some(srtt), Some(rttvar)) = (self.srtt, self.rttvar) {
            self.rto = clamp_rto(srtt + rttvar * 4);
        }
    }

    /// Scale the RTO after a retransmission timeout, capped at [`MAX_RTO`].
    pub fn back_off(&mut self, factor: f64) {
        self.rto = clamp_rto(self.rto.mul_f64(factor));
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Smoothed RTT, `None` before the first sample.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// RTT variation, `None` before the first sample.
    pub fn rttvar(&self) -> Option<Duration> {
        self.rttvar
    }
}

fn clamp_rto(rto: Duration) -> Duration {
    rto.clamp(MIN_RTO, MAX_RTO)
}
