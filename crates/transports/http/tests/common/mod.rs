//! Shared fixtures for route tests

#![allow(dead_code)]

use async_trait::async_trait;
use mediarelay_host_status::{HostStatusProbe, ProbeConfig};
use mediarelay_http::{AppState, BroadcastHub};
use mediarelay_webrtc::{
    Error, LocalityPolicy, MediaSocketConfig, NegotiatedTransport, Negotiator,
    RTCSessionDescription, Result, RtpPacket, RtpSink, SessionConfig, SessionCoordinator,
    TransportEvent, TransportHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug,webrtc=warn")
        .with_test_writer()
        .try_init();
}

pub const SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub fn description(kind: &str, sdp: &str) -> RTCSessionDescription {
    serde_json::from_value(serde_json::json!({ "type": kind, "sdp": sdp })).unwrap()
}

/// Base64 offer blob as a browser would post it
pub fn offer_blob() -> String {
    mediarelay_webrtc::encode_description(&description("offer", SDP)).unwrap()
}

struct DiscardSink;

#[async_trait]
impl RtpSink for DiscardSink {
    async fn send_packet(&self, _packet: &RtpPacket) -> Result<()> {
        Ok(())
    }
}

struct NoopTransport;

#[async_trait]
impl TransportHandle for NoopTransport {
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Negotiator that answers every offer, or fails when told to
#[derive(Default)]
pub struct StubNegotiator {
    pub fail: AtomicBool,
    pub policies: Mutex<Vec<LocalityPolicy>>,
    // Held so the session's event stream stays open
    events: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl StubNegotiator {
    pub fn failing() -> Self {
        let negotiator = Self::default();
        negotiator.fail.store(true, Ordering::SeqCst);
        negotiator
    }

    pub fn last_policy(&self) -> Option<LocalityPolicy> {
        self.policies.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Negotiator for StubNegotiator {
    async fn negotiate(
        &self,
        _offer: RTCSessionDescription,
        policy: &LocalityPolicy,
    ) -> Result<NegotiatedTransport> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Negotiation {
                stage: "set_remote_description",
                message: "injected failure".to_string(),
            });
        }

        self.policies.lock().unwrap().push(policy.clone());
        let (tx, events) = mpsc::channel(8);
        self.events.lock().unwrap().push(tx);

        Ok(NegotiatedTransport {
            answer: description("answer", SDP),
            handle: Arc::new(NoopTransport),
            video_track: Arc::new(DiscardSink),
            audio_track: Arc::new(DiscardSink),
            events,
        })
    }
}

fn loopback_socket() -> MediaSocketConfig {
    MediaSocketConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        buffer_bytes: 64 * 1024,
    }
}

/// Probe that only reads an empty directory tree
pub fn offline_probe(root: &std::path::Path) -> HostStatusProbe {
    HostStatusProbe::with_config(ProbeConfig {
        power_supply_root: root.join("power_supply"),
        net_root: root.join("net"),
        thermal_zones: vec![root.join("thermal_zone0/temp")],
        storage_path: root.to_path_buf(),
        use_commands: false,
    })
}

/// App state over `negotiator` with loopback media sockets
pub fn app_state(negotiator: Arc<StubNegotiator>, root: &std::path::Path) -> AppState {
    let mut config = SessionConfig::new();
    config.video = loopback_socket();
    config.audio = loopback_socket();
    config.capture.enabled = false;

    AppState::new(
        Arc::new(SessionCoordinator::new(config, negotiator)),
        BroadcastHub::spawn(16),
        Arc::new(offline_probe(root)),
    )
}
