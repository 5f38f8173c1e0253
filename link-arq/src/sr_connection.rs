//! Selective-Repeat sender and receiver roles.
//!
//! The sender keeps one deadline per slot. Rather than juggling N timers, the
//! state loop sweeps all deadlines on a fixed tick (`poll_interval`) and
//! resends only the slots that expired. NAKs trigger an immediate resend of
//! the named slot. Acknowledgements arrive on the same queue as in the other
//! engines, so all engine state stays owned by the one loop.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ArqConfig, Protocol};
use crate::connection::{
    accept_frame, decode_ack, lost_note, next_datagram, reply, retries_exhausted, ConnError,
    ReceiverReport, SenderLink, SenderReport,
};
use crate::frame::{AckKind, Frame};
use crate::link::{FrameReader, LinkWriter};
use crate::payload::{chunked, PayloadSink};
use crate::simulator::Simulator;
use crate::sr_receiver::SrReceiver;
use crate::sr_sender::{SrAck, SrSender};
use crate::timer::RttEstimator;

/// RTO multiplier applied on each sweep that finds expired slots.
const SR_BACKOFF: f64 = 1.5;

/// Selective-Repeat sender: per-frame ACK/NAK, selective resend.
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
    let window = config.window_for(Protocol::SelectiveRepeat);
    let (src, dst) = config.addresses();
    let mut link = SenderLink::open(stream, sim);
    let mut rtt = RttEstimator::new(config.initial_rto);
    let mut sender = SrSender::new(0, window);
    let mut report = SenderReport::default();
    let mut source = chunked(source);
    let mut exhausted = false;
    log::info!("[sr] sending {src} → {dst}, window={window}");

    let mut tick = tokio::time::interval(config.poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        while !exhausted && sender.can_send() {
            let Some(payload) = source.next() else {
                exhausted = true;
                break;
            };
            let frame = Frame::new(src, dst, sender.next_seq, payload)?;
            let wire = frame.encode();
            let outcome = link.transmit(&wire, &mut report).await?;
            let seq = sender.push(wire, Instant::now(), rtt.rto());
            report.payloads += 1;
            log::debug!(
                "[sr] → DATA seq={seq} len={} in_flight={}{}",
                frame.payload().len(),
                sender.in_flight(),
                lost_note(outcome)
            );
        }

        if exhausted && sender.is_idle() {
            break;
        }

        tokio::select! {
            item = link.acks.recv() => {
                let datagram = next_datagram(item)?;
                let Some(ack) = decode_ack(Protocol::SelectiveRepeat, &datagram, &mut report) else {
                    continue;
                };
                match ack.kind {
                    AckKind::Ack => match sender.on_ack(ack.seq, Instant::now()) {
                        SrAck::Accepted { rtt_sample, retired } => {
                            if let Some(sample) = rtt_sample {
                                rtt.observe(sample);
                            }
                            log::debug!("[sr] ← ACK {} retired={retired} base={}", ack.seq, sender.base);
                        }
                        SrAck::Ignored => {
                            report.ignored += 1;
                            log::debug!("[sr] ← ACK {} ignored", ack.seq);
                        }
                    },
                    AckKind::Nak => {
                        let seq = ack.seq;
                        if retries_exhausted(config.max_retries, sender.tx_count(seq)) {
                            log::error!("[sr] giving up on seq={seq}");
                            return Err(ConnError::MaxRetriesExceeded { seq });
                        }
                        let outcome = match sender.on_nak(seq) {
                            Some(wire) => link.transmit(wire, &mut report).await?,
                            None => {
                                report.ignored += 1;
                                log::debug!("[sr] ← NAK {seq} ignored");
                                continue;
                            }
                        };
                        report.retransmitted.push(seq);
                        sender.mark_resent(seq, Instant::now(), rtt.rto());
                        log::debug!("[sr] ← NAK {seq}; → DATA seq={seq} (resend){}", lost_note(outcome));
                    }
                }
            }

            _ = tick.tick() => {
                let due = sender.expired(Instant::now());
                if due.is_empty() {
                    continue;
                }
                rtt.back_off(SR_BACKOFF);
                log::warn!(
                    "[sr] timeout for {} slot(s) {:?} (rto={}ms)",
                    due.len(),
                    due,
                    rtt.rto().as_millis()
                );
                for seq in due {
                    if retries_exhausted(config.max_retries, sender.tx_count(seq)) {
                        log::error!("[sr] giving up on seq={seq}");
                        return Err(ConnError::MaxRetriesExceeded { seq });
                    }
                    let outcome = match sender.wire(seq) {
                        Some(wire) => link.transmit(wire, &mut report).await?,
                        None => continue,
                    };
                    report.retransmitted.push(seq);
                    sender.mark_resent(seq, Instant::now(), rtt.rto());
                    log::debug!("[sr] → DATA seq={seq} (resend){}", lost_note(outcome));
                }
            }
        }
    }

    report.final_rto = rtt.rto();
    report.channel = link.finish(Protocol::SelectiveRepeat).await?;
    log::info!(
        "[sr] done: {} payloads, {} transmissions, {} retransmitted",
        report.payloads,
        report.transmissions,
        report.retransmitted.len()
    );
    Ok(report)
}

/// Selective-Repeat receiver: buffers out-of-order frames, delivers in order.
pub async fn receive<S, K>(
    stream: S,
    config: &ArqConfig,
    sim: Simulator,
    mut sink: K,
) -> Result<ReceiverReport, ConnError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    K: PayloadSink,
{
    let window = config.window_for(Protocol::SelectiveRepeat);
    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FrameReader::new(reader);
    let mut link = LinkWriter::new(writer, sim);
    let mut receiver = SrReceiver::new(0, window);
    let mut report = ReceiverReport::default();
    log::info!("[sr] receiving, window={window}");

    while let Some(inbound) = frames.next().await.map_err(ConnError::Transport)? {
        let frame = match accept_frame(inbound) {
            Ok(frame) => frame,
            Err(e) => {
                report.corrupt += 1;
                log::warn!("[sr] ← frame dropped: {e}");
                reply(Protocol::SelectiveRepeat, &mut link, receiver.on_corrupt(), &mut report).await?;
                continue;
            }
        };

        let seq = frame.seq();
        let out = receiver.on_frame(seq, frame.into_payload());
        if out.duplicate {
            report.duplicates += 1;
        }
        let Some(ack) = out.reply else {
            report.discarded += 1;
            log::debug!("[sr] ← DATA seq={seq} outside window (base={})", receiver.base);
            continue;
        };
        log::debug!(
            "[sr] ← DATA seq={seq} delivering={} buffered={}",
            out.delivered.len(),
            receiver.buffered()
        );
        for payload in out.delivered {
            sink.deliver(payload).map_err(ConnError::Sink)?;
            report.delivered += 1;
        }
        reply(Protocol::SelectiveRepeat, &mut link, ack, &mut report).await?;
    }

    report.skipped = frames.skipped();
    report.channel = link.stats();
    log::info!("[sr] done: {} delivered, {} corrupt", report.delivered, report.corrupt);
    Ok(report)
}
