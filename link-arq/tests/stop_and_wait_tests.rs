//! End-to-end tests for the Stop-and-Wait engine.

mod common;

use common::{config, numbered, run_session, seeded, Scripted};
use link_arq::config::Protocol;
use link_arq::connection::ConnError;
use link_arq::simulator::Simulator;

#[tokio::test]
async fn test_sw_delivers_every_payload_once_in_order() {
    let payloads = numbered(25);
    let session = run_session(
        Protocol::StopAndWait,
        config(None),
        seeded(0.0, 3, 0.0, 1),
        seeded(0.0, 3, 0.0, 2),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads);
    assert_eq!(sender.payloads, 25);
    assert!(sender.retransmitted.is_empty());
    assert_eq!(receiver.delivered, 25);
    assert_eq!(receiver.duplicates, 0);
}

#[tokio::test]
async fn test_sw_resends_a_corrupted_frame() {
    let payloads = numbered(4);
    let session = run_session(
        Protocol::StopAndWait,
        config(None),
        Scripted::corrupting(&[1]),
        Simulator::ideal(),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads);
    assert_eq!(sender.retransmitted, vec![1]);
    assert_eq!(receiver.corrupt, 1);
}

#[tokio::test]
async fn test_sw_lost_ack_causes_duplicate_not_redelivery() {
    let payloads = numbered(3);
    // The receiver's first ACK never reaches the sender.
    let session = run_session(
        Protocol::StopAndWait,
        config(None),
        Simulator::ideal(),
        Scripted::dropping(&[0]),
        payloads.clone(),
    )
    .await;

    let sender = session.sender.expect("sender failed");
    let receiver = session.receiver.expect("receiver failed");
    assert_eq!(session.delivered, payloads);
    assert_eq!(sender.retransmitted, vec![0]);
    assert_eq!(receiver.duplicates, 1);
    assert_eq!(receiver.delivered, 3);
}

#[tokio::test]
async fn test_sw_gives_up_after_max_retries() {
    let mut cfg = config(None);
    cfg.max_retries = Some(2);
    // Every ACK is lost, so the first frame can never be confirmed.
    let session = run_session(
        Protocol::StopAndWait,
        cfg,
        Simulator::ideal(),
        seeded(0.0, 0, 1.0, 3),
        numbered(2),
    )
    .await;

    match session.sender {
        Err(ConnError::MaxRetriesExceeded { seq }) => assert_eq!(seq, 0),
        other => panic!("expected MaxRetriesExceeded, got {other:?}"),
    }
    assert_eq!(session.delivered, numbered(1));
}
