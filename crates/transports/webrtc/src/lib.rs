//! Single-session WebRTC gateway core for MediaRelay
//!
//! This crate admits one browser-initiated streaming session at a time,
//! negotiates a WebRTC transport for it, and bridges locally received RTP
//! datagrams (video and audio) into the negotiated outbound tracks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  SessionCoordinator                                        │
//! │  ├─ Admission (single-flight gate, generation counted)     │
//! │  ├─ Negotiator (locality policy → answer + state events)   │
//! │  ├─ MediaBridge × 2 (UDP :5004 video, :5006 audio → RTP)   │
//! │  ├─ CaptureProcess (optional external encoder)             │
//! │  └─ CleanupToken (once-only teardown, any terminal source) │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use mediarelay_webrtc::{Locality, LocalityPolicy, NegotiationConfig};
//!
//! let config = NegotiationConfig::default();
//! let policy = LocalityPolicy::for_caller("192.168.0.20:8080", &config);
//!
//! assert_eq!(policy.locality, Locality::Local);
//! assert!(policy.ice_servers.is_empty());
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;

pub use config::{CaptureConfig, MediaSocketConfig, NegotiationConfig, SessionConfig};
pub use error::{Error, Result};
pub use media::{BridgeFault, MediaBridge, MediaKind, RtpSink, MAX_DATAGRAM_SIZE};
pub use peer::{
    decode_offer, encode_description, Locality, LocalityPolicy, NegotiatedTransport, Negotiator,
    PortRange, StateSource, TransportEvent, TransportHandle, TransportState, WebRtcNegotiator,
};
pub use session::{
    ActiveSession, CaptureProcess, CleanupToken, SessionAnswer, SessionCoordinator,
    TerminationReason,
};

// Re-exported so callers can build offers without depending on webrtc directly
pub use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
pub use webrtc::rtp::packet::Packet as RtpPacket;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
