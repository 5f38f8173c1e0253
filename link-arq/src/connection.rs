//! Sender and receiver roles: Stop-and-Wait, plus the pieces every engine
//! shares.
//!
//! A role owns one connected byte stream for the whole session:
//!
//! ```text
//!  sender role                                   receiver role
//!  ┌──────────────────────┐   frames    ┌──────────────────────┐
//!  │ state loop ─▶ LinkWriter ─────────▶│ FrameReader ─▶ engine│
//!  │    ▲                  │            │                 │    │
//!  │    │ mpsc             │   acks     │                 ▼    │
//!  │ ack listener task ◀───┼────────────┼── LinkWriter ◀─ reply│
//!  └──────────────────────┘            └──────────────────────┘
//! ```
//!
//! The sender's state loop is the only code that touches engine state; the
//! listener task only moves bytes. When the source is exhausted and every
//! frame is acknowledged, the sender half-closes the stream and the receiver
//! returns on end-of-stream.
//!
//! [`run_sender`] and [`run_receiver`] pick the engine from a [`Protocol`].

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::config::{ArqConfig, ConfigError, Protocol};
use crate::frame::{self, Ack, AckKind, Frame, FrameError, ACK_LEN};
use crate::link::{self, FrameReader, Inbound, LinkWriter, Transmit, ACK_QUEUE};
use crate::payload::{chunked, PayloadSink};
use crate::receiver::{Receiver, Verdict};
use crate::sender::Sender;
use crate::simulator::{Simulator, SimulatorStats};
use crate::timer::RttEstimator;
use crate::{gbn_connection, sr_connection};

/// How long a finished sender waits for the receiver to close its side.
const LINGER: Duration = Duration::from_secs(5);

/// RTO multiplier applied on every Stop-and-Wait timeout.
const SW_BACKOFF: f64 = 2.0;

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Errors that end a session.
///
/// Integrity and protocol failures never show up here; they are logged,
/// counted in the session report and recovered from locally.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("payload sink failed: {0}")]
    Sink(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("frame {seq} still unacknowledged after the retry limit")]
    MaxRetriesExceeded { seq: u8 },
}

/// What a sender role did during one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderReport {
    /// Payloads framed and sent (after splitting oversized ones).
    pub payloads: usize,
    /// Datagrams handed to the channel, first sends and resends alike.
    pub transmissions: u64,
    /// Sequence number of every retransmitted frame, in order.
    pub retransmitted: Vec<u8>,
    /// Transmissions the simulated channel lost.
    pub dropped: u64,
    /// Valid ACK datagrams received.
    pub acks: u64,
    /// Valid NAK datagrams received.
    pub naks: u64,
    /// Acknowledgements discarded: corrupt, unknown type, or stale.
    pub ignored: u64,
    /// RTO in force when the session ended.
    pub final_rto: Duration,
    /// Faults injected on this role's outbound direction.
    pub channel: SimulatorStats,
}

impl SenderReport {
    pub(crate) fn record(&mut self, outcome: Transmit) {
        self.transmissions += 1;
        if outcome == Transmit::Dropped {
            self.dropped += 1;
        }
    }
}

/// What a receiver role did during one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverReport {
    /// Payloads handed to the sink.
    pub delivered: usize,
    /// Frames that failed the integrity check.
    pub corrupt: u64,
    /// Valid frames dropped as out of order or out of window.
    pub discarded: u64,
    /// Valid frames that had already been accepted.
    pub duplicates: u64,
    pub acks_sent: u64,
    pub naks_sent: u64,
    /// Bytes discarded while hunting for a frame boundary.
    pub skipped: u64,
    /// Faults injected on this role's outbound direction.
    pub channel: SimulatorStats,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Drive a sender role for `protocol` until `source` is delivered.
///
/// Outbound datagrams are impaired as described by `config.simulator`.
pub async fn run_sender<S, I>(
    stream: S,
    protocol: Protocol,
    config: &ArqConfig,
    source: I,
) -> Result<SenderReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: IntoIterator<Item = Vec<u8>>,
{
    let sim = Simulator::new(config.simulator.clone());
    run_sender_with(stream, protocol, config, sim, source).await
}

/// Like [`run_sender`], with an explicit simulator for outbound datagrams.
pub async fn run_sender_with<S, I>(
    stream: S,
    protocol: Protocol,
    config: &ArqConfig,
    sim: Simulator,
    source: I,
) -> Result<SenderReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: IntoIterator<Item = Vec<u8>>,
{
    config.validate(protocol)?;
    match protocol {
        Protocol::StopAndWait => send(stream, config, sim, source).await,
        Protocol::GoBackN => gbn_connection::send(stream, config, sim, source).await,
        Protocol::SelectiveRepeat => sr_connection::send(stream, config, sim, source).await,
    }
}

/// Drive a receiver role for `protocol` until the sender closes the stream.
pub async fn run_receiver<S, K>(
    stream: S,
    protocol: Protocol,
    config: &ArqConfig,
    sink: K,
) -> Result<ReceiverReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    K: PayloadSink,
{
    let sim = Simulator::new(config.simulator.clone());
    run_receiver_with(stream, protocol, config, sim, sink).await
}

/// Like [`run_receiver`], with an explicit simulator for acknowledgements.
pub async fn run_receiver_with<S, K>(
    stream: S,
    protocol: Protocol,
    config: &ArqConfig,
    sim: Simulator,
    sink: K,
) -> Result<ReceiverReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    K: PayloadSink,
{
    config.validate(protocol)?;
    match protocol {
        Protocol::StopAndWait => receive(stream, config, sim, sink).await,
        Protocol::GoBackN => gbn_connection::receive(stream, config, sim, sink).await,
        Protocol::SelectiveRepeat => sr_connection::receive(stream, config, sim, sink).await,
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Sender-side transport: impaired writer plus the acknowledgement queue.
pub(crate) struct SenderLink<S> {
    pub(crate) writer: LinkWriter<WriteHalf<S>>,
    pub(crate) acks: mpsc::Receiver<io::Result<[u8; ACK_LEN]>>,
    listener: JoinHandle<()>,
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> SenderLink<S> {
    pub(crate) fn open(stream: S, sim: Simulator) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, acks) = mpsc::channel(ACK_QUEUE);
        let listener = link::spawn_ack_listener(reader, tx);
        Self {
            writer: LinkWriter::new(writer, sim),
            acks,
            listener,
        }
    }

    /// Transmit and account for one datagram.
    pub(crate) async fn transmit(
        &mut self,
        datagram: &[u8],
        report: &mut SenderReport,
    ) -> Result<Transmit, ConnError> {
        let outcome = self
            .writer
            .transmit(datagram)
            .await
            .map_err(ConnError::Transport)?;
        report.record(outcome);
        Ok(outcome)
    }

    /// Half-close, then wait for the receiver to close its side.
    pub(crate) async fn finish(&mut self, protocol: Protocol) -> Result<SimulatorStats, ConnError> {
        let tag = protocol.tag();
        self.writer.shutdown().await.map_err(ConnError::Transport)?;
        let drained = timeout(LINGER, async {
            while let Some(late) = self.acks.recv().await {
                if let Err(e) = late {
                    log::debug!("[{tag}] ack stream closed with error: {e}");
                }
            }
        })
        .await;
        if drained.is_err() {
            log::warn!("[{tag}] peer did not close within {}s", LINGER.as_secs());
        }
        Ok(self.writer.stats())
    }
}

impl<S> Drop for SenderLink<S> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Unwrap one item from the acknowledgement queue.
///
/// The queue closing while frames are outstanding means the receiver went
/// away mid-session.
pub(crate) fn next_datagram(
    item: Option<io::Result<[u8; ACK_LEN]>>,
) -> Result<[u8; ACK_LEN], ConnError> {
    match item {
        Some(Ok(datagram)) => Ok(datagram),
        Some(Err(e)) => Err(ConnError::Transport(e)),
        None => Err(ConnError::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "receiver closed the connection with frames outstanding",
        ))),
    }
}

/// Decode an acknowledgement, counting it in `report`.
pub(crate) fn decode_ack(
    protocol: Protocol,
    datagram: &[u8],
    report: &mut SenderReport,
) -> Option<Ack> {
    match Ack::decode(datagram) {
        Ok(ack) => {
            match ack.kind {
                AckKind::Ack => report.acks += 1,
                AckKind::Nak => report.naks += 1,
            }
            Some(ack)
        }
        Err(e) => {
            report.ignored += 1;
            log::warn!("[{}] ← discarding acknowledgement: {e}", protocol.tag());
            None
        }
    }
}

/// `true` once a frame sent `tx_count` times may not be sent again.
pub(crate) fn retries_exhausted(max_retries: Option<u32>, tx_count: u32) -> bool {
    max_retries.is_some_and(|max| tx_count > max)
}

/// Parse a datagram from the [`FrameReader`], integrity-checked again so
/// nothing unverified reaches an engine.
pub(crate) fn accept_frame(inbound: Inbound) -> Result<Frame, FrameError> {
    match inbound {
        Inbound::Frame(bytes) => {
            frame::check(&bytes)?;
            Frame::decode(&bytes)
        }
        Inbound::Corrupt(e) => Err(e),
    }
}

/// Send one acknowledgement from a receiver role.
pub(crate) async fn reply<W: AsyncWrite + Unpin>(
    protocol: Protocol,
    link: &mut LinkWriter<W>,
    ack: Ack,
    report: &mut ReceiverReport,
) -> Result<(), ConnError> {
    let outcome = link
        .transmit(&ack.encode())
        .await
        .map_err(ConnError::Transport)?;
    match ack.kind {
        AckKind::Ack => report.acks_sent += 1,
        AckKind::Nak => report.naks_sent += 1,
    }
    log::debug!("[{}] → {} {}{}", protocol.tag(), ack.kind, ack.seq, lost_note(outcome));
    Ok(())
}

pub(crate) fn lost_note(outcome: Transmit) -> &'static str {
    match outcome {
        Transmit::Sent => "",
        Transmit::Dropped => " (lost)",
    }
}

// ---------------------------------------------------------------------------
// Stop-and-Wait
// ---------------------------------------------------------------------------

/// Stop-and-Wait sender: one frame in flight, resent until acknowledged.
pub async fn send<S, I>(
    stream: S,
    config: &ArqConfig,
    sim: Simulator,
    source: I,
) -> Result<SenderReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: IntoIterator<Item = Vec<u8>>,
{
    let (src, dst) = config.addresses();
    let mut link = SenderLink::open(stream, sim);
    let mut rtt = RttEstimator::new(config.initial_rto);
    let mut sender = Sender::new(0);
    let mut report = SenderReport::default();
    log::info!("[sw] sending {src} → {dst}");

    for payload in chunked(source) {
        let seq = sender.next_seq;
        let frame = Frame::new(src, dst, seq, payload)?;
        let wire = frame.encode();
        let outcome = link.transmit(&wire, &mut report).await?;
        log::debug!(
            "[sw] → DATA seq={seq} len={}{}",
            frame.payload().len(),
            lost_note(outcome)
        );
        sender.record_sent(wire, Instant::now());
        report.payloads += 1;

        let timer = tokio::time::sleep(rtt.rto());
        tokio::pin!(timer);

        while sender.has_unacked() {
            tokio::select! {
                item = link.acks.recv() => {
                    let datagram = next_datagram(item)?;
                    let Some(ack) = decode_ack(Protocol::StopAndWait, &datagram, &mut report) else {
                        continue;
                    };
                    if ack.kind == AckKind::Nak {
                        report.ignored += 1;
                        log::debug!("[sw] ← NAK {} ignored", ack.seq);
                        continue;
                    }
                    match sender.on_ack(ack.seq, Instant::now()) {
                        Some(sample) => {
                            if let Some(sample) = sample {
                                rtt.observe(sample);
                            }
                            log::debug!("[sw] ← ACK {} (rto={}ms)", ack.seq, rtt.rto().as_millis());
                        }
                        None => {
                            report.ignored += 1;
                            log::debug!("[sw] ← ACK {} ignored (awaiting {seq})", ack.seq);
                        }
                    }
                }

                _ = &mut timer => {
                    if retries_exhausted(config.max_retries, sender.tx_count()) {
                        log::error!("[sw] giving up on seq={seq}");
                        return Err(ConnError::MaxRetriesExceeded { seq });
                    }
                    rtt.back_off(SW_BACKOFF);
                    log::warn!("[sw] timeout seq={seq}; resending (rto={}ms)", rtt.rto().as_millis());
                    let outcome = match sender.on_timeout() {
                        Some(wire) => link.transmit(wire, &mut report).await?,
                        None => break,
                    };
                    log::debug!("[sw] → DATA seq={seq} (resend){}", lost_note(outcome));
                    report.retransmitted.push(seq);
                    sender.on_retransmit(Instant::now());
                    timer.as_mut().reset(Instant::now() + rtt.rto());
                }
            }
        }
    }

    report.final_rto = rtt.rto();
    report.channel = link.finish(Protocol::StopAndWait).await?;
    log::info!(
        "[sw] done: {} payloads, {} transmissions, {} retransmitted",
        report.payloads,
        report.transmissions,
        report.retransmitted.len()
    );
    Ok(report)
}

/// Stop-and-Wait receiver: accepts only the expected frame.
pub async fn receive<S, K>(
    stream: S,
    _config: &ArqConfig,
    sim: Simulator,
    mut sink: K,
) -> Result<ReceiverReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    K: PayloadSink,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FrameReader::new(reader);
    let mut link = LinkWriter::new(writer, sim);
    let mut receiver = Receiver::new(0);
    let mut report = ReceiverReport::default();
    log::info!("[sw] receiving");

    while let Some(inbound) = frames.next().await.map_err(ConnError::Transport)? {
        let frame = match accept_frame(inbound) {
            Ok(frame) => frame,
            Err(e) => {
                report.corrupt += 1;
                log::warn!("[sw] ← frame dropped: {e}");
                continue;
            }
        };

        let seq = frame.seq();
        match receiver.on_frame(seq) {
            Verdict::Deliver => {
                log::debug!("[sw] ← DATA seq={seq} len={}", frame.payload().len());
                sink.deliver(frame.into_payload()).map_err(ConnError::Sink)?;
                report.delivered += 1;
                reply(Protocol::StopAndWait, &mut link, Ack::ack(seq), &mut report).await?;
            }
            Verdict::Duplicate => {
                report.duplicates += 1;
                log::debug!("[sw] ← DATA seq={seq} duplicate");
                reply(Protocol::StopAndWait, &mut link, Ack::ack(seq), &mut report).await?;
            }
            Verdict::Discard => {
                report.discarded += 1;
                log::debug!("[sw] ← DATA seq={seq} discarded (expected {})", receiver.expected);
            }
        }
    }

    report.skipped = frames.skipped();
    report.channel = link.stats();
    log::info!("[sw] done: {} delivered, {} corrupt", report.delivered, report.corrupt);
    Ok(report)
}
