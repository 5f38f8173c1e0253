//! Session configuration shared by every sender and receiver role.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::frame::MacAddr;
use crate::simulator::SimulatorConfig;
use crate::timer::DEFAULT_INITIAL_RTO;
use crate::window::MAX_WINDOW;

/// Default tick at which Selective-Repeat sweeps its slot deadlines.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors produced while validating a configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("window size {0} outside 1..=128")]
    Window(usize),

    #[error("stop-and-wait requires a window of 1, got {0}")]
    StopAndWaitWindow(usize),

    #[error("poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("unknown protocol {0:?} (expected sw, gbn or sr)")]
    UnknownProtocol(String),
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Which ARQ engine drives a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    StopAndWait,
    GoBackN,
    SelectiveRepeat,
}

impl Protocol {
    /// Window used when none is configured.
    pub fn default_window(self) -> usize {
        match self {
            Protocol::StopAndWait => 1,
            Protocol::GoBackN | Protocol::SelectiveRepeat => 4,
        }
    }

    /// Short tag used in log lines.
    pub fn tag(self) -> &'static str {
        match self {
            Protocol::StopAndWait => "sw",
            Protocol::GoBackN => "gbn",
            Protocol::SelectiveRepeat => "sr",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::StopAndWait => f.write_str("stop-and-wait"),
            Protocol::GoBackN => f.write_str("go-back-n"),
            Protocol::SelectiveRepeat => f.write_str("selective-repeat"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sw" | "stop-and-wait" | "stopwait" => Ok(Protocol::StopAndWait),
            "gbn" | "go-back-n" | "gobackn" => Ok(Protocol::GoBackN),
            "sr" | "selective-repeat" | "selectiverepeat" => Ok(Protocol::SelectiveRepeat),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ArqConfig
// ---------------------------------------------------------------------------

/// Tunables for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ArqConfig {
    /// Impairments applied to every datagram this role transmits.
    pub simulator: SimulatorConfig,
    /// Window size N; `None` uses [`Protocol::default_window`].
    pub window_size: Option<usize>,
    /// Starting RTO before any round trip is measured.
    pub initial_rto: Duration,
    /// Selective-Repeat deadline sweep interval.
    pub poll_interval: Duration,
    /// Give up after this many retransmissions of one frame.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// Local link address; random when absent.
    pub src: Option<MacAddr>,
    /// Peer link address; random when absent.
    pub dst: Option<MacAddr>,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            window_size: None,
            initial_rto: DEFAULT_INITIAL_RTO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: None,
            src: None,
            dst: None,
        }
    }
}

impl ArqConfig {
    /// Effective window size for `protocol`.
    pub fn window_for(&self, protocol: Protocol) -> usize {
        self.window_size.unwrap_or_else(|| protocol.default_window())
    }

    /// Check every bound before a role starts.
    pub fn validate(&self, protocol: Protocol) -> Result<(), ConfigError> {
        let sim = &self.simulator;
        for (name, value) in [
            ("bit error rate", sim.bit_error_rate),
            ("loss rate", sim.loss_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }

        let window = self.window_for(protocol);
        if !(1..=MAX_WINDOW).contains(&window) {
            return Err(ConfigError::Window(window));
        }
        if protocol == Protocol::StopAndWait && window != 1 {
            return Err(ConfigError::StopAndWaitWindow(window));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// `(src, dst)` link addresses, filling in random ones where unset.
    pub fn addresses(&self) -> (MacAddr, MacAddr) {
        let mut rng = rand::rng();
        let src = self.src.unwrap_or_else(|| MacAddr::random(&mut rng));
        let dst = self.dst.unwrap_or_else(|| MacAddr::random(&mut rng));
        (src, dst)
    }
}
