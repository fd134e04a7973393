//! Inbound media path: local UDP datagrams → parsed RTP → outbound tracks

mod rtp_bridge;
mod socket;

pub use rtp_bridge::{BridgeFault, BridgeStats, MediaBridge, RtpSink};
pub use socket::bind_media_socket;

/// Receive buffer size per datagram
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Kind of media carried by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Human-readable label used in errors and logs
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
