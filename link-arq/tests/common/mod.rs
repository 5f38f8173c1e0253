//! Shared harness for the end-to-end tests.
//!
//! Every session runs both roles as separate tokio tasks over a loopback TCP
//! connection, with a timeout guard so a stuck engine fails the test instead
//! of hanging it.

#![allow(dead_code)]

use std::time::Duration;

use link_arq::config::{ArqConfig, Protocol};
use link_arq::connection::{
    run_receiver_with, run_sender_with, ConnError, ReceiverReport, SenderReport,
};
use link_arq::simulator::{FaultModel, Simulator, SimulatorConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Initial RTO used by every test (the floor of the estimator).
pub const RTO: Duration = Duration::from_millis(200);

/// Upper bound on any single session.
pub const GUARD: Duration = Duration::from_secs(60);

/// A connected loopback pair: `(sender side, receiver side)`.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (accepted.expect("accept failed").0, client.expect("connect failed"))
}

/// `count` distinguishable payloads of assorted lengths.
pub fn numbered(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut p = format!("payload-{i:04}-").into_bytes();
            p.resize(p.len() + i % 90, b'a' + (i % 26) as u8);
            p
        })
        .collect()
}

pub fn config(window: Option<usize>) -> ArqConfig {
    ArqConfig {
        window_size: window,
        initial_rto: RTO,
        ..ArqConfig::default()
    }
}

pub fn seeded(bit_error_rate: f64, max_delay_ms: u64, loss_rate: f64, seed: u64) -> Simulator {
    Simulator::new(SimulatorConfig {
        bit_error_rate,
        max_delay: Duration::from_millis(max_delay_ms),
        loss_rate,
        seed: Some(seed),
    })
}

/// Fault model that hits exact transmissions, counted from 0.
///
/// Corruption XORs `mask` into one byte of the datagram (clamped to its last
/// byte). [`Scripted::corrupting`] uses byte 20, inside the payload area of a
/// frame, so the length field stays intact.
pub struct Scripted {
    corrupt: Vec<u64>,
    drop: Vec<u64>,
    at: usize,
    mask: u8,
    sent: u64,
}

impl Scripted {
    pub fn corrupting(indices: &[u64]) -> Simulator {
        Self::flipping(indices, 20, 0x10)
    }

    /// Flip `mask` at byte `at` of the listed transmissions.
    pub fn flipping(indices: &[u64], at: usize, mask: u8) -> Simulator {
        Simulator::with_model(Box::new(Scripted {
            corrupt: indices.to_vec(),
            drop: Vec::new(),
            at,
            mask,
            sent: 0,
        }))
    }

    pub fn dropping(indices: &[u64]) -> Simulator {
        Simulator::with_model(Box::new(Scripted {
            corrupt: Vec::new(),
            drop: indices.to_vec(),
            at: 0,
            mask: 0,
            sent: 0,
        }))
    }
}

impl FaultModel for Scripted {
    fn delay(&mut self) -> Duration {
        Duration::ZERO
    }

    fn corrupt(&mut self, bytes: &mut [u8]) -> u32 {
        if !self.corrupt.contains(&self.sent) || bytes.is_empty() {
            return 0;
        }
        let at = self.at.min(bytes.len() - 1);
        bytes[at] ^= self.mask;
        self.mask.count_ones()
    }

    fn drop_frame(&mut self) -> bool {
        let index = self.sent;
        self.sent += 1;
        self.drop.contains(&index)
    }
}

/// Everything a finished session produced.
pub struct Session {
    pub sender: Result<SenderReport, ConnError>,
    pub receiver: Result<ReceiverReport, ConnError>,
    pub delivered: Vec<Vec<u8>>,
}

pub async fn run_session(
    protocol: Protocol,
    config: ArqConfig,
    sender_sim: Simulator,
    receiver_sim: Simulator,
    payloads: Vec<Vec<u8>>,
) -> Session {
    let (tx_stream, rx_stream) = tcp_pair().await;
    let sender_cfg = config.clone();

    let sender = tokio::spawn(async move {
        run_sender_with(tx_stream, protocol, &sender_cfg, sender_sim, payloads).await
    });
    let receiver = tokio::spawn(async move {
        let mut delivered = Vec::new();
        let report = run_receiver_with(rx_stream, protocol, &config, receiver_sim, &mut delivered).await;
        (report, delivered)
    });

    let (s, r) = timeout(GUARD, async { tokio::join!(sender, receiver) })
        .await
        .expect("session did not finish in time");
    let (receiver, delivered) = r.expect("receiver task panicked");
    Session {
        sender: s.expect("sender task panicked"),
        receiver,
        delivered,
    }
}
