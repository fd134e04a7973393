//! Fake negotiation engine for session lifecycle tests
//!
//! Records every locality policy it is handed, returns transports whose
//! close calls are counted, and keeps the state-event senders so tests can
//! inject connection and ICE transitions.

#![allow(dead_code)]

use async_trait::async_trait;
use mediarelay_webrtc::{
    Error, LocalityPolicy, MediaSocketConfig, NegotiatedTransport, Negotiator, RTCSessionDescription,
    Result, RtpPacket, RtpSink, SessionConfig, TransportEvent, TransportHandle,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug,webrtc=warn")
        .with_test_writer()
        .try_init();
}

pub fn description(kind: &str, sdp: &str) -> RTCSessionDescription {
    serde_json::from_value(serde_json::json!({ "type": kind, "sdp": sdp })).unwrap()
}

pub fn offer() -> RTCSessionDescription {
    description("offer", OFFER_SDP)
}

/// Loopback ephemeral sockets, capture disabled
pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::new();
    config.video = loopback_socket();
    config.audio = loopback_socket();
    config.capture.enabled = false;
    config
}

pub fn loopback_socket() -> MediaSocketConfig {
    MediaSocketConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        buffer_bytes: 256 * 1024,
    }
}

/// Minimal RTP datagram with the given sequence number
pub fn rtp_datagram(sequence: u16) -> Vec<u8> {
    let seq = sequence.to_be_bytes();
    let mut datagram = vec![0x80, 96, seq[0], seq[1], 0, 0, 0x0b, 0xb8, 0xde, 0xad, 0xbe, 0xef];
    datagram.extend_from_slice(&[0x65, 0x88, 0x84, 0x00]);
    datagram
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Sink that records sequence numbers and can be switched to failing
#[derive(Default)]
pub struct FakeSink {
    pub fail: AtomicBool,
    pub sequences: Mutex<Vec<u16>>,
}

impl FakeSink {
    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RtpSink for FakeSink {
    async fn send_packet(&self, packet: &RtpPacket) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::TransportFault("track closed".to_string()));
        }
        self.sequences.lock().push(packet.header.sequence_number);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub closes: AtomicUsize,
}

impl FakeTransport {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportHandle for FakeTransport {
    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One negotiation performed by [`FakeNegotiator`]
pub struct Negotiated {
    pub policy: LocalityPolicy,
    pub transport: Arc<FakeTransport>,
    pub events: mpsc::Sender<TransportEvent>,
    pub video: Arc<FakeSink>,
    pub audio: Arc<FakeSink>,
}

#[derive(Default)]
pub struct FakeNegotiator {
    pub delay: Option<Duration>,
    pub fail_stage: Mutex<Option<&'static str>>,
    pub sessions: Mutex<Vec<Negotiated>>,
}

impl FakeNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_at(&self, stage: &'static str) {
        *self.fail_stage.lock() = Some(stage);
    }

    pub fn succeed(&self) {
        *self.fail_stage.lock() = None;
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn policy(&self, index: usize) -> LocalityPolicy {
        self.sessions.lock()[index].policy.clone()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        Arc::clone(&self.sessions.lock()[index].transport)
    }

    pub fn events(&self, index: usize) -> mpsc::Sender<TransportEvent> {
        self.sessions.lock()[index].events.clone()
    }

    pub fn video_sink(&self, index: usize) -> Arc<FakeSink> {
        Arc::clone(&self.sessions.lock()[index].video)
    }

    pub fn audio_sink(&self, index: usize) -> Arc<FakeSink> {
        Arc::clone(&self.sessions.lock()[index].audio)
    }
}

#[async_trait]
impl Negotiator for FakeNegotiator {
    async fn negotiate(
        &self,
        _offer: RTCSessionDescription,
        policy: &LocalityPolicy,
    ) -> Result<NegotiatedTransport> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fail_stage = *self.fail_stage.lock();
        if let Some(stage) = fail_stage {
            return Err(Error::Negotiation {
                stage,
                message: "injected failure".to_string(),
            });
        }

        let (events_tx, events) = mpsc::channel(32);
        let transport = Arc::new(FakeTransport::default());
        let video = Arc::new(FakeSink::default());
        let audio = Arc::new(FakeSink::default());

        self.sessions.lock().push(Negotiated {
            policy: policy.clone(),
            transport: Arc::clone(&transport),
            events: events_tx,
            video: Arc::clone(&video),
            audio: Arc::clone(&audio),
        });

        Ok(NegotiatedTransport {
            answer: description("answer", ANSWER_SDP),
            handle: transport,
            video_track: video,
            audio_track: audio,
            events,
        })
    }
}
