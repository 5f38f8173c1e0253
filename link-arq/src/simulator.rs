//! Channel impairment simulator.
//!
//! Real links delay, corrupt and lose frames. To exercise the retransmission
//! machinery without depending on actual network conditions, every outbound
//! datagram passes through a [`Simulator`] before reaching the transport:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Delay        | Suspend for a uniform draw from `[0, max_delay]`.        |
//! | Bit errors   | Flip every bit independently with probability `p`.       |
//! | Frame loss   | Suppress the whole transmission with probability `q`.    |
//!
//! The fault decisions come from a [`FaultModel`]. [`RandomFaults`] is the
//! probabilistic model; tests plug in scripted models to hit one exact frame.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
///
/// Probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that any single bit is flipped.
    pub bit_error_rate: f64,
    /// Upper bound of the one-way delay.
    pub max_delay: Duration,
    /// Probability that a whole frame is dropped.
    pub loss_rate: f64,
    /// Seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default.
        Self {
            bit_error_rate: 0.0,
            max_delay: Duration::ZERO,
            loss_rate: 0.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// `true` when no fault can ever be injected.
    pub fn is_ideal(&self) -> bool {
        self.bit_error_rate <= 0.0 && self.max_delay.is_zero() && self.loss_rate <= 0.0
    }
}

// ---------------------------------------------------------------------------
// FaultModel
// ---------------------------------------------------------------------------

/// Source of fault decisions for one direction of a link.
pub trait FaultModel: Send {
    /// How long the next transmission is held back.
    fn delay(&mut self) -> Duration;

    /// Corrupt `bytes` in place and return the number of flipped bits.
    fn corrupt(&mut self, bytes: &mut [u8]) -> u32;

    /// `true` when the next transmission should be suppressed.
    fn drop_frame(&mut self) -> bool;
}

/// Independent random faults drawn from a seedable generator.
#[derive(Debug)]
pub struct RandomFaults {
    config: SimulatorConfig,
    rng: StdRng,
}

impl RandomFaults {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }
}

impl FaultModel for RandomFaults {
    fn delay(&mut self) -> Duration {
        let max_ms = self.config.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.random_range(0..=max_ms))
    }

    fn corrupt(&mut self, bytes: &mut [u8]) -> u32 {
        let p = self.config.bit_error_rate;
        if p <= 0.0 {
            return 0;
        }
        let p = p.min(1.0);
        let mut flipped = 0;
        for byte in bytes.iter_mut() {
            let mut mask = 0u8;
            for bit in 0..8 {
                if self.rng.random_bool(p) {
                    mask |= 1 << bit;
                }
            }
            *byte ^= mask;
            flipped += mask.count_ones();
        }
        flipped
    }

    fn drop_frame(&mut self) -> bool {
        let q = self.config.loss_rate;
        q > 0.0 && self.rng.random_bool(q.min(1.0))
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Running totals of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Transmissions held back by a non-zero delay.
    pub delayed: u64,
    /// Bits flipped across all transmissions.
    pub bits_flipped: u64,
    /// Transmissions corrupted in at least one bit.
    pub corrupted: u64,
    /// Transmissions suppressed entirely.
    pub dropped: u64,
}

/// A fault-injecting stage in front of the transport writer.
pub struct Simulator {
    model: Box<dyn FaultModel>,
    stats: SimulatorStats,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator").field("stats", &self.stats).finish()
    }
}

impl Simulator {
    /// Simulator driven by [`RandomFaults`].
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_model(Box::new(RandomFaults::new(config)))
    }

    /// Pass-through simulator (no faults).
    pub fn ideal() -> Self {
        Self::new(SimulatorConfig::default())
    }

    /// Simulator driven by a custom fault model.
    pub fn with_model(model: Box<dyn FaultModel>) -> Self {
        Self {
            model,
            stats: SimulatorStats::default(),
        }
    }

    /// Suspend for the model's next delay draw.
    pub async fn delay(&mut self) {
        let delay = self.model.delay();
        if delay.is_zero() {
            return;
        }
        self.stats.delayed += 1;
        log::trace!("[sim] delaying {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }

    /// Flip bits of `bytes` in place; returns how many were flipped.
    pub fn corrupt(&mut self, bytes: &mut [u8]) -> u32 {
        let flipped = self.model.corrupt(bytes);
        if flipped > 0 {
            self.stats.bits_flipped += u64::from(flipped);
            self.stats.corrupted += 1;
            log::debug!("[sim] flipped {flipped} bit(s) in {}-byte datagram", bytes.len());
        }
        flipped
    }

    /// `true` when the caller must suppress this transmission.
    pub fn drop_frame(&mut self) -> bool {
        let dropped = self.model.drop_frame();
        if dropped {
            self.stats.dropped += 1;
        }
        dropped
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }
}
