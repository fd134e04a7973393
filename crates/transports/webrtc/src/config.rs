//! Configuration types for session negotiation and media bridging

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default video RTP port
pub const DEFAULT_VIDEO_PORT: u16 = 5004;

/// Default audio RTP port
pub const DEFAULT_AUDIO_PORT: u16 = 5006;

/// Default SO_RCVBUF / SO_SNDBUF size for media sockets (2 MiB)
pub const DEFAULT_SOCKET_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Main configuration for the session coordinator
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Negotiation policy inputs
    pub negotiation: NegotiationConfig,

    /// Inbound video datagram socket
    pub video: MediaSocketConfig,

    /// Inbound audio datagram socket
    pub audio: MediaSocketConfig,

    /// External capture process
    pub capture: CaptureConfig,
}

/// Inputs for the per-request locality policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Relay-assist (STUN) servers used for non-local callers
    pub stun_servers: Vec<String>,

    /// Lowest ephemeral UDP port for local callers (default: 50000)
    pub local_port_min: u16,

    /// Highest ephemeral UDP port for local callers (default: 50100)
    pub local_port_max: u16,
}

/// Inbound media socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSocketConfig {
    /// Bind address
    pub bind_addr: SocketAddr,

    /// Receive/send buffer size in bytes
    pub buffer_bytes: usize,
}

/// External capture process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Launch the capture process on session start (GST_MODE != external)
    pub enabled: bool,

    /// Capture executable
    pub program: String,

    /// Capture arguments
    pub args: Vec<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            local_port_min: 50000,
            local_port_max: 50100,
        }
    }
}

impl MediaSocketConfig {
    /// Socket bound on all interfaces at `port`
    pub fn any(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            buffer_bytes: DEFAULT_SOCKET_BUFFER_BYTES,
        }
    }
}

impl Default for MediaSocketConfig {
    fn default() -> Self {
        Self::any(DEFAULT_VIDEO_PORT)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "gst-launch-1.0".to_string(),
            args: default_capture_args(DEFAULT_VIDEO_PORT),
        }
    }
}

/// Camera → H.264 → RTP → udpsink pipeline feeding the video socket
pub fn default_capture_args(video_port: u16) -> Vec<String> {
    [
        "v4l2src",
        "device=/dev/video0",
        "io-mode=4",
        "!",
        "video/x-raw,width=1280,height=960",
        "!",
        "queue",
        "!",
        "mpph264enc",
        "profile=baseline",
        "header-mode=each-idr",
        "!",
        "rtph264pay",
        "!",
        "udpsink",
        "host=127.0.0.1",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(format!("port={}", video_port)))
    .collect()
}

impl Default for SessionConfig {
    /// Video on 5004 and audio on its own port, 5006
    fn default() -> Self {
        Self {
            negotiation: NegotiationConfig::default(),
            video: MediaSocketConfig::any(DEFAULT_VIDEO_PORT),
            audio: MediaSocketConfig::any(DEFAULT_AUDIO_PORT),
            capture: CaptureConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the local port range is empty or inverted
    /// - a socket buffer size is zero
    /// - video and audio share the same non-ephemeral bind address
    /// - capture is enabled with an empty program
    pub fn validate(&self) -> Result<()> {
        let n = &self.negotiation;
        if n.local_port_min == 0 || n.local_port_min > n.local_port_max {
            return Err(Error::InvalidConfig(format!(
                "local port range must satisfy 0 < min <= max, got {}-{}",
                n.local_port_min, n.local_port_max
            )));
        }

        for (label, socket) in [("video", &self.video), ("audio", &self.audio)] {
            if socket.buffer_bytes == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{} socket buffer must be non-zero",
                    label
                )));
            }
        }

        if self.video.bind_addr.port() != 0 && self.video.bind_addr == self.audio.bind_addr {
            return Err(Error::InvalidConfig(format!(
                "video and audio cannot share bind address {}",
                self.video.bind_addr
            )));
        }

        if self.capture.enabled && self.capture.program.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "capture program must be set when capture is enabled".to_string(),
            ));
        }

        Ok(())
    }
}
