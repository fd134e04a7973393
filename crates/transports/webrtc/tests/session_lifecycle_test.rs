//! Session lifecycle scenarios against a fake negotiation engine
//!
//! Covers admission under concurrency, rollback on partial setup, teardown
//! from every terminal source, and the locality policy handed to the engine.

mod harness;

use harness::{
    eventually, init_test_tracing, offer, rtp_datagram, test_config, FakeNegotiator,
};
use mediarelay_webrtc::{
    Error, Locality, PortRange, SessionCoordinator, StateSource, TerminationReason,
    TransportEvent, TransportState,
};
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(2);

fn coordinator(negotiator: Arc<FakeNegotiator>) -> SessionCoordinator {
    SessionCoordinator::new(test_config(), negotiator)
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_concurrent_starts_admit_exactly_one() {
    init_test_tracing();
    let negotiator = Arc::new(FakeNegotiator::with_delay(Duration::from_millis(50)));
    let coordinator = Arc::new(coordinator(negotiator.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.start_session(offer(), "127.0.0.1").await })
        })
        .collect();

    let mut admitted = 0;
    let mut busy = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::AlreadyInProgress) => busy += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(busy, 7);
    assert_eq!(negotiator.count(), 1);
    assert!(coordinator.in_progress());

    // Still busy until cleanup runs
    assert!(matches!(
        coordinator.start_session(offer(), "127.0.0.1").await,
        Err(Error::AlreadyInProgress)
    ));

    negotiator
        .events(0)
        .send(TransportEvent::connection(TransportState::Closed))
        .await
        .unwrap();
    assert!(eventually(SETTLE, || !coordinator.in_progress()).await);

    assert!(coordinator.start_session(offer(), "127.0.0.1").await.is_ok());
}

#[tokio::test]
async fn test_negotiation_failure_leaves_gate_open() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    negotiator.fail_at("create_answer");
    let err = coordinator
        .start_session(offer(), "127.0.0.1")
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some("create_answer"));
    assert!(err.is_setup_failure());
    assert!(!coordinator.in_progress());

    negotiator.succeed();
    assert!(coordinator.start_session(offer(), "127.0.0.1").await.is_ok());
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_audio_bind_failure_releases_video_and_transport() {
    init_test_tracing();
    let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap();

    let negotiator = Arc::new(FakeNegotiator::new());
    let mut config = test_config();
    config.audio.bind_addr = taken;
    let coordinator = SessionCoordinator::new(config, negotiator.clone());

    let err = coordinator
        .start_session(offer(), "127.0.0.1")
        .await
        .unwrap_err();

    match &err {
        Error::ResourceBind { label, addr, .. } => {
            assert_eq!(*label, "Audio");
            assert_eq!(*addr, taken);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(negotiator.transport(0).close_count(), 1);
    assert!(!coordinator.in_progress());
    assert!(coordinator.active_session().is_none());

    // The gate is free and a new session can start once the port is released
    drop(occupied);
    assert!(coordinator.start_session(offer(), "127.0.0.1").await.is_ok());
}

#[tokio::test]
async fn test_capture_launch_failure_rolls_back() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let mut config = test_config();
    config.capture.enabled = true;
    config.capture.program = "/nonexistent/mediarelay-capture".to_string();
    let coordinator = SessionCoordinator::new(config, negotiator.clone());

    let err = coordinator
        .start_session(offer(), "127.0.0.1")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Capture(_)));
    assert_eq!(negotiator.transport(0).close_count(), 1);
    assert!(!coordinator.in_progress());
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_simultaneous_terminal_events_close_once() {
    init_test_tracing();
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let session = coordinator.active_session().unwrap();
    let events = negotiator.events(0);

    events
        .send(TransportEvent::ice(TransportState::Checking))
        .await
        .unwrap();
    events
        .send(TransportEvent::ice(TransportState::Disconnected))
        .await
        .unwrap();
    events
        .send(TransportEvent::connection(TransportState::Failed))
        .await
        .unwrap();

    assert!(eventually(SETTLE, || !coordinator.in_progress()).await);
    session.wait_closed().await;

    assert_eq!(negotiator.transport(0).close_count(), 1);
    assert!(session.sockets_closed());
    assert!(!session.terminate(TerminationReason::Shutdown).await);
    assert_eq!(negotiator.transport(0).close_count(), 1);
    assert!(eventually(SETTLE, || coordinator.active_session().is_none()).await);
}

#[tokio::test]
async fn test_non_terminal_events_keep_session() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let events = negotiator.events(0);
    for state in [
        TransportState::Checking,
        TransportState::Connected,
        TransportState::Completed,
    ] {
        events.send(TransportEvent::ice(state)).await.unwrap();
    }
    events
        .send(TransportEvent::connection(TransportState::Connected))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.in_progress());
    assert_eq!(negotiator.transport(0).close_count(), 0);
}

#[tokio::test]
async fn test_bridge_write_failure_drives_cleanup() {
    init_test_tracing();
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let session = coordinator.active_session().unwrap();

    let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&rtp_datagram(1), session.video_addr()).unwrap();
    let video = negotiator.video_sink(0);
    assert!(eventually(SETTLE, || video.sequences.lock().len() == 1).await);

    video.set_failing();
    sender.send_to(&rtp_datagram(2), session.video_addr()).unwrap();

    assert!(eventually(SETTLE, || !coordinator.in_progress()).await);
    session.wait_closed().await;
    assert!(session.sockets_closed());
    assert_eq!(negotiator.transport(0).close_count(), 1);
}

#[tokio::test]
async fn test_dropped_event_stream_is_terminal() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let session = coordinator.active_session().unwrap();

    // Drop every sender for the session's event stream
    negotiator.sessions.lock().clear();

    assert!(eventually(SETTLE, || !coordinator.in_progress()).await);
    session.wait_closed().await;
    assert!(session.sockets_closed());
}

#[tokio::test]
async fn test_shutdown_tears_down_active_session() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let session = coordinator.active_session().unwrap();

    coordinator.shutdown().await;

    assert!(!coordinator.in_progress());
    assert!(session.sockets_closed());
    assert_eq!(negotiator.transport(0).close_count(), 1);
}

// =============================================================================
// Operator reset
// =============================================================================

#[tokio::test]
async fn test_force_reset_leaves_resources_and_guards_newer_session() {
    init_test_tracing();
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let stale = coordinator.active_session().unwrap();

    assert!(coordinator.force_reset());
    assert!(!coordinator.in_progress());
    assert!(!stale.sockets_closed());
    assert_eq!(negotiator.transport(0).close_count(), 0);

    // A new session is admitted while the old one still runs
    coordinator.start_session(offer(), "127.0.0.1").await.unwrap();
    let current = coordinator.active_session().unwrap();
    assert_ne!(current.id(), stale.id());

    // The stale session's cleanup must not clear the newer session's flag
    negotiator
        .events(0)
        .send(TransportEvent::connection(TransportState::Failed))
        .await
        .unwrap();
    stale.wait_closed().await;

    assert!(stale.sockets_closed());
    assert!(coordinator.in_progress());
    assert_eq!(
        coordinator.active_session().map(|s| s.id()),
        Some(current.id())
    );

    negotiator
        .events(1)
        .send(TransportEvent {
            source: StateSource::Ice,
            state: TransportState::Closed,
        })
        .await
        .unwrap();
    assert!(eventually(SETTLE, || !coordinator.in_progress()).await);

    // Reset with nothing active is still accepted
    assert!(!coordinator.force_reset());
}

// =============================================================================
// Locality policy
// =============================================================================

#[tokio::test]
async fn test_local_caller_gets_no_stun_and_bounded_ports() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    let answer = coordinator
        .start_session(offer(), "192.168.1.10:8080")
        .await
        .unwrap();
    assert_eq!(answer.locality, Locality::Local);

    let policy = negotiator.policy(0);
    assert!(policy.ice_servers.is_empty());
    assert_eq!(policy.port_range, Some(PortRange { min: 50000, max: 50100 }));
}

#[tokio::test]
async fn test_remote_caller_gets_stun() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    let answer = coordinator
        .start_session(offer(), "relay.example.com")
        .await
        .unwrap();
    assert_eq!(answer.locality, Locality::Remote);

    let policy = negotiator.policy(0);
    assert_eq!(policy.ice_servers, vec!["stun:stun.l.google.com:19302".to_string()]);
    assert!(policy.port_range.is_none());
}

#[tokio::test]
async fn test_classification_is_stable_across_sessions() {
    let negotiator = Arc::new(FakeNegotiator::new());
    let coordinator = coordinator(negotiator.clone());

    for index in 0..3 {
        coordinator
            .start_session(offer(), "10.1.2.3:8080")
            .await
            .unwrap();
        assert_eq!(negotiator.policy(index).locality, Locality::Local);
        coordinator.shutdown().await;
    }
}
