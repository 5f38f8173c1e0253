//! Seeded runs over an impaired channel, one per engine.
//!
//! Frames are delayed, lost and hit by bit errors, including errors in the
//! length field that throw the receiver off the frame boundaries.
//! Acknowledgements are hit too. Whatever the channel does, the receiver must
//! hand over every payload exactly once and in order.

mod common;

use std::io::Cursor;

use common::{config, numbered, run_session, seeded, tcp_pair, Scripted, GUARD};
use link_arq::config::Protocol;
use link_arq::payload::{self, LineSink, LineSource};
use link_arq::simulator::Simulator;
use rand::rngs::StdRng;
use rand::SeedableRng;

async fn lossy_round_trip(protocol: Protocol, window: Option<usize>, seed: u64) {
    let payloads = numbered(60);
    let session = run_session(
        protocol,
        config(window),
        seeded(0.0, 2, 0.1, seed),
        seeded(0.003, 2, 0.05, seed + 1),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads, "{protocol}: delivery mismatch");
    assert_eq!(receiver.delivered, 60);
    assert_eq!(sender.payloads, 60);
    assert!(sender.transmissions >= 60);
    assert_eq!(sender.dropped, sender.channel.dropped);
}

#[tokio::test]
async fn test_sw_survives_lossy_channel() {
    lossy_round_trip(Protocol::StopAndWait, None, 101).await;
}

#[tokio::test]
async fn test_gbn_survives_lossy_channel() {
    lossy_round_trip(Protocol::GoBackN, Some(4), 202).await;
}

#[tokio::test]
async fn test_sr_survives_lossy_channel() {
    lossy_round_trip(Protocol::SelectiveRepeat, Some(8), 303).await;
}

async fn frame_ber_round_trip(
    protocol: Protocol,
    window: Option<usize>,
    ber: f64,
    count: usize,
    seed: u64,
) {
    let payloads = numbered(count);
    let session = run_session(
        protocol,
        config(window),
        seeded(ber, 2, 0.05, seed),
        Simulator::ideal(),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads, "{protocol}: delivery mismatch");
    assert_eq!(receiver.delivered, count);
    assert!(sender.channel.corrupted > 0, "{protocol}: no frame was corrupted");
    assert!(receiver.corrupt > 0);
}

#[tokio::test]
async fn test_sw_survives_frame_bit_errors() {
    frame_ber_round_trip(Protocol::StopAndWait, None, 0.001, 16, 404).await;
}

#[tokio::test]
async fn test_gbn_survives_frame_bit_errors() {
    frame_ber_round_trip(Protocol::GoBackN, Some(4), 0.001, 20, 505).await;
}

#[tokio::test]
async fn test_sr_survives_frame_bit_errors() {
    frame_ber_round_trip(Protocol::SelectiveRepeat, Some(8), 0.002, 24, 606).await;
}

/// Transmission #1 carries seq 1 with bit 0x40 of the length's low byte
/// flipped: a 14-byte payload now claims 78 bytes.
async fn length_flip_round_trip(protocol: Protocol, window: Option<usize>) {
    let payloads = numbered(6);
    let session = run_session(
        protocol,
        config(window),
        Scripted::flipping(&[1], 13, 0x40),
        Simulator::ideal(),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads, "{protocol}: delivery mismatch");
    assert_eq!(receiver.delivered, 6);
    assert_eq!(receiver.corrupt, 1);
    // The whole 65-byte damaged frame and nothing after it.
    assert_eq!(receiver.skipped, 65);
    assert_eq!(sender.retransmitted.first(), Some(&1));
}

#[tokio::test]
async fn test_sw_recovers_from_length_flip() {
    length_flip_round_trip(Protocol::StopAndWait, None).await;
}

#[tokio::test]
async fn test_gbn_recovers_from_length_flip() {
    length_flip_round_trip(Protocol::GoBackN, Some(4)).await;
}

#[tokio::test]
async fn test_sr_recovers_from_length_flip() {
    length_flip_round_trip(Protocol::SelectiveRepeat, Some(4)).await;
}

#[tokio::test]
async fn test_line_file_round_trip() {
    let mut rng = StdRng::seed_from_u64(12345);
    let lines = payload::generate(&mut rng, 40, 10, 120);
    let mut input = Vec::new();
    payload::write_lines(&mut input, &lines).unwrap();

    let (tx_stream, rx_stream) = tcp_pair().await;
    let cfg = config(Some(4));
    let sender_cfg = cfg.clone();

    let sender = tokio::spawn(async move {
        let source = LineSource::new(Cursor::new(input));
        link_arq::connection::run_sender_with(
            tx_stream,
            Protocol::SelectiveRepeat,
            &sender_cfg,
            seeded(0.0, 1, 0.05, 7),
            source,
        )
        .await
    });
    let receiver = tokio::spawn(async move {
        let mut sink = LineSink::new(Vec::new());
        let report = link_arq::connection::run_receiver_with(
            rx_stream,
            Protocol::SelectiveRepeat,
            &cfg,
            Simulator::ideal(),
            &mut sink,
        )
        .await;
        (report, sink.into_inner())
    });

    let (s, r) = tokio::time::timeout(GUARD, async { tokio::join!(sender, receiver) })
        .await
        .expect("session did not finish in time");
    s.unwrap().expect("sender failed");
    let (report, output) = r.unwrap();
    report.expect("receiver failed");

    let mut expected = Vec::new();
    payload::write_lines(&mut expected, &lines).unwrap();
    assert_eq!(output, expected);
}

/// Serves one line, then fails every read.
struct FailingInput {
    served: bool,
}

impl std::io::Read for FailingInput {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("disk gone"))
    }
}

impl std::io::BufRead for FailingInput {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.served {
            Err(std::io::Error::other("disk gone"))
        } else {
            Ok(b"first\n")
        }
    }

    fn consume(&mut self, amt: usize) {
        if amt > 0 {
            self.served = true;
        }
    }
}

#[tokio::test]
async fn test_source_read_error_survives_the_session() {
    let (tx_stream, rx_stream) = tcp_pair().await;
    let cfg = config(None);
    let sender_cfg = cfg.clone();

    let sender = tokio::spawn(async move {
        let mut source = LineSource::new(FailingInput { served: false });
        let report = link_arq::connection::run_sender_with(
            tx_stream,
            Protocol::StopAndWait,
            &sender_cfg,
            Simulator::ideal(),
            &mut source,
        )
        .await;
        (report, source.take_error())
    });
    let receiver = tokio::spawn(async move {
        let mut delivered = Vec::new();
        let report = link_arq::connection::run_receiver_with(
            rx_stream,
            Protocol::StopAndWait,
            &cfg,
            Simulator::ideal(),
            &mut delivered,
        )
        .await;
        (report, delivered)
    });

    let (s, r) = tokio::time::timeout(GUARD, async { tokio::join!(sender, receiver) })
        .await
        .expect("session did not finish in time");
    let (report, error) = s.unwrap();
    assert_eq!(report.expect("sender failed").payloads, 1);
    assert_eq!(error.expect("read error was lost").to_string(), "disk gone");
    let (report, delivered) = r.unwrap();
    report.expect("receiver failed");
    assert_eq!(delivered, vec![b"first".to_vec()]);
}
