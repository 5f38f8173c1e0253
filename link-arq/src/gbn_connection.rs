//! Go-Back-N sender and receiver roles.
//!
//! # Architecture
//!
//! ```text
//!  source ──▶ send() state loop                         receive()
//!             ├── GbnSender (window, cached frames)     ├── GbnReceiver (expected)
//!             ├── RttEstimator                          └── ACK(expected) after
//!             └── one retransmit timer                      every frame
//! ```
//!
//! The sender fills its window, then multiplexes acknowledgements and the
//! retransmit timer with `tokio::select!`. The timer tracks the oldest
//! unacknowledged frame; on expiry every cached frame from `base` onwards is
//! resent. The receiver accepts only the frame it expects and always answers
//! with a cumulative ACK, so a repeated ACK of an unchanged value is all the
//! sender needs to eventually go back.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::config::{ArqConfig, Protocol};
use crate::connection::{
    accept_frame, decode_ack, lost_note, next_datagram, reply, retries_exhausted, ConnError,
    ReceiverReport, SenderLink, SenderReport,
};
use crate::frame::{Ack, AckKind, Frame};
use crate::gbn_receiver::GbnReceiver;
use crate::gbn_sender::GbnSender;
use crate::link::{FrameReader, LinkWriter};
use crate::payload::{chunked, PayloadSink};
use crate::simulator::Simulator;
use crate::timer::RttEstimator;
use crate::window::seq_offset;

/// RTO multiplier applied on every window timeout.
const GBN_BACKOFF: f64 = 2.0;

// ---------------------------------------------------------------------------
// Sender role
// ---------------------------------------------------------------------------

/// Go-Back-N sender: up to N frames in flight, cumulative ACKs, bulk resend.
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
    let window = config.window_for(Protocol::GoBackN);
    let (src, dst) = config.addresses();
    let mut link = SenderLink::open(stream, sim);
    let mut rtt = RttEstimator::new(config.initial_rto);
    let mut sender = GbnSender::new(0, window);
    let mut report = SenderReport::default();
    let mut source = chunked(source);
    let mut exhausted = false;
    log::info!("[gbn] sending {src} → {dst}, window={window}");

    // A "disarmed" timer fires very far in the future. The `timer_armed`
    // guard in select! prevents acting on it when the window is empty.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);
    let mut timer_armed = false;

    loop {
        // ── Fill the window ─────────────────────────────────────────────
        while !exhausted && sender.can_send() {
            let Some(payload) = source.next() else {
                exhausted = true;
                break;
            };
            let seq = sender.next_seq;
            let frame = Frame::new(src, dst, seq, payload)?;
            let wire = frame.encode();
            let outcome = link.transmit(&wire, &mut report).await?;
            sender.record_sent(wire, Instant::now());
            report.payloads += 1;
            log::debug!(
                "[gbn] → DATA seq={seq} len={} in_flight={}{}",
                frame.payload().len(),
                sender.in_flight(),
                lost_note(outcome)
            );
            // Arm the retransmit timer when the first frame enters.
            if !timer_armed {
                timer.as_mut().reset(Instant::now() + rtt.rto());
                timer_armed = true;
            }
        }

        if exhausted && !sender.has_unacked() {
            break;
        }

        tokio::select! {
            // ── Branch 1: acknowledgement ───────────────────────────────
            item = link.acks.recv() => {
                let datagram = next_datagram(item)?;
                let Some(ack) = decode_ack(Protocol::GoBackN, &datagram, &mut report) else {
                    continue;
                };
                if ack.kind == AckKind::Nak {
                    report.ignored += 1;
                    log::debug!("[gbn] ← NAK {} ignored", ack.seq);
                    continue;
                }

                let out = sender.on_ack(ack.seq, Instant::now());
                if out.acked == 0 {
                    report.ignored += 1;
                    log::debug!("[gbn] ← ACK {} (no progress, base={})", ack.seq, sender.base);
                    continue;
                }
                if let Some(sample) = out.rtt_sample {
                    rtt.observe(sample);
                }
                log::debug!(
                    "[gbn] ← ACK {} slid={} rto={}ms",
                    ack.seq,
                    out.acked,
                    rtt.rto().as_millis()
                );

                if sender.has_unacked() {
                    // Restart the timer for the new oldest frame.
                    timer.as_mut().reset(Instant::now() + rtt.rto());
                } else {
                    // Window drained; disarm the timer.
                    timer_armed = false;
                    timer.as_mut().reset(Instant::now() + far_future);
                }
            }

            // ── Branch 2: retransmit timeout ────────────────────────────
            _ = &mut timer, if timer_armed => {
                let tx_count = sender.window_entries().next().map_or(0, |e| e.tx_count);
                if retries_exhausted(config.max_retries, tx_count) {
                    log::error!("[gbn] giving up on seq={}", sender.base);
                    return Err(ConnError::MaxRetriesExceeded { seq: sender.base });
                }
                rtt.back_off(GBN_BACKOFF);
                log::warn!(
                    "[gbn] timeout base={}; resending {} frame(s) (rto={}ms)",
                    sender.base,
                    sender.in_flight(),
                    rtt.rto().as_millis()
                );

                // Go-Back-N: resend every unacked frame from base.
                for entry in sender.window_entries() {
                    let outcome = link.transmit(&entry.wire, &mut report).await?;
                    report.retransmitted.push(entry.seq);
                    log::debug!("[gbn] → DATA seq={} (resend){}", entry.seq, lost_note(outcome));
                }
                sender.on_retransmit(Instant::now());
                timer.as_mut().reset(Instant::now() + rtt.rto());
            }
        }
    }

    report.final_rto = rtt.rto();
    report.channel = link.finish(Protocol::GoBackN).await?;
    log::info!(
        "[gbn] done: {} payloads, {} transmissions, {} retransmitted",
        report.payloads,
        report.transmissions,
        report.retransmitted.len()
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Receiver role
// ---------------------------------------------------------------------------

/// Go-Back-N receiver: in-order acceptance, cumulative ACK after every frame.
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
    let mut receiver = GbnReceiver::new(0);
    let mut report = ReceiverReport::default();
    log::info!("[gbn] receiving");

    while let Some(inbound) = frames.next().await.map_err(ConnError::Transport)? {
        match accept_frame(inbound) {
            Ok(frame) => {
                let seq = frame.seq();
                if receiver.on_frame(seq) {
                    log::debug!("[gbn] ← DATA seq={seq} len={}", frame.payload().len());
                    sink.deliver(frame.into_payload()).map_err(ConnError::Sink)?;
                    report.delivered += 1;
                } else if seq_offset(seq, receiver.expected) < 0 {
                    report.duplicates += 1;
                    log::debug!("[gbn] ← DATA seq={seq} duplicate");
                } else {
                    report.discarded += 1;
                    log::debug!(
                        "[gbn] ← DATA seq={seq} out of order (expected {})",
                        receiver.expected
                    );
                }
            }
            Err(e) => {
                report.corrupt += 1;
                log::warn!("[gbn] ← frame dropped: {e}");
            }
        }
        reply(Protocol::GoBackN, &mut link, Ack::ack(receiver.ack_number()), &mut report).await?;
    }

    report.skipped = frames.skipped();
    report.channel = link.stats();
    log::info!("[gbn] done: {} delivered, {} corrupt", report.delivered, report.corrupt);
    Ok(report)
}
