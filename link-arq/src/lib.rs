//! `link-arq`: sliding-window ARQ over a simulated unreliable link.
//!
//! Three retransmission engines share one frame format, one CRC-32 integrity
//! check, one channel simulator and one adaptive RTO estimator. The link
//! itself is any reliable byte stream; faults are injected on purpose so the
//! engines have something to recover from.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐    frames     ┌──────────┐
//!  │  Sender  │──────────────▶│ Receiver │
//!  └────┬─────┘               └─────┬────┘
//!       │     ACK / NAK             │
//!       │◀──────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │        connection roles           │
//!  │  (own the engine state + stream)  │
//!  └────┬──────────────────────────────┘
//!       │ datagrams
//!  ┌────▼──────┐   ┌───────────┐
//!  │   link    │──▶│ simulator │  (delay, bit errors, loss)
//!  └───────────┘   └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]: wire format, CRC-32, acknowledgement datagrams
//! - [`window`]: modulo-256 sequence arithmetic
//! - [`state`]: per-frame transmission state
//! - [`timer`]: Jacobson/Karels RTT estimator
//! - [`simulator`]: delay, bit-error and loss injection
//! - [`link`]: datagram framing over a byte stream
//! - [`sender`]: stop-and-wait outbound state
//! - [`receiver`]: stop-and-wait inbound state
//! - [`gbn_sender`]: Go-Back-N outbound window state machine
//! - [`gbn_receiver`]: Go-Back-N inbound cumulative-ACK state machine
//! - [`sr_sender`]: Selective-Repeat outbound per-slot state machine
//! - [`sr_receiver`]: Selective-Repeat inbound reorder buffer
//! - [`connection`]: role dispatch, stop-and-wait roles, errors, reports
//! - [`gbn_connection`]: Go-Back-N roles
//! - [`sr_connection`]: Selective-Repeat roles
//! - [`config`]: protocol selection and tunables
//! - [`payload`]: payload sources, sinks and test data

pub mod config;
pub mod connection;
pub mod frame;
pub mod gbn_connection;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod link;
pub mod payload;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod sr_connection;
pub mod sr_receiver;
pub mod sr_sender;
pub mod state;
pub mod timer;
pub mod window;

pub use config::{ArqConfig, ConfigError, Protocol};
pub use connection::{run_receiver, run_sender, ConnError, ReceiverReport, SenderReport};
