//! UDP → RTP → track forwarding loop
//!
//! Each bridge owns one datagram socket and one forwarding task. Datagrams
//! that do not parse as RTP are counted and skipped. A receive error or a
//! failed write to the outbound sink is fatal: the loop exits, the socket is
//! dropped, and a [`BridgeFault`] is reported so the session can be torn
//! down.

use super::{socket::bind_media_socket, MediaKind, MAX_DATAGRAM_SIZE};
use crate::config::MediaSocketConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::util::Unmarshal;

/// Outbound destination for parsed RTP packets
#[async_trait]
pub trait RtpSink: Send + Sync {
    /// Write one packet to the negotiated track
    async fn send_packet(&self, packet: &Packet) -> Result<()>;
}

#[async_trait]
impl RtpSink for TrackLocalStaticRTP {
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(|e| Error::TransportFault(format!("track write failed: {}", e)))
    }
}

/// Fatal bridge failure reported to the session supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeFault {
    pub kind: MediaKind,
    pub error: String,
}

/// Forwarding counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Packets written to the sink
    pub forwarded: u64,
    /// Datagrams that did not parse as RTP
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    forwarded: AtomicU64,
    malformed: AtomicU64,
}

/// One inbound socket forwarding into one outbound track
pub struct MediaBridge {
    kind: MediaKind,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl MediaBridge {
    /// Bind the socket described by `config` and start forwarding into `sink`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        kind: MediaKind,
        config: &MediaSocketConfig,
        sink: Arc<dyn RtpSink>,
        faults: mpsc::Sender<BridgeFault>,
    ) -> Result<Self> {
        let socket = bind_media_socket(kind, config)?;
        let local_addr = socket.local_addr().map_err(|source| Error::ResourceBind {
            label: kind.label(),
            addr: config.bind_addr,
            source,
        })?;

        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let task = tokio::spawn(forward_loop(ForwardLoop {
            kind,
            socket,
            sink,
            faults,
            cancel: cancel.clone(),
            closed: Arc::clone(&closed),
            counters: Arc::clone(&counters),
        }));

        info!("{} bridge listening on {}", kind, local_addr);

        Ok(Self {
            kind,
            local_addr,
            cancel,
            task: Mutex::new(Some(task)),
            closed,
            counters,
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once the forwarding loop has exited
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }

    /// Stop forwarding and wait for the socket to be released
    ///
    /// Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("{} bridge task ended abnormally: {}", self.kind, e);
            }
            let stats = self.stats();
            debug!(
                "{} bridge closed (forwarded={}, malformed={})",
                self.kind, stats.forwarded, stats.malformed
            );
        }
    }
}

impl Drop for MediaBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ForwardLoop {
    kind: MediaKind,
    socket: UdpSocket,
    sink: Arc<dyn RtpSink>,
    faults: mpsc::Sender<BridgeFault>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

async fn forward_loop(state: ForwardLoop) {
    let ForwardLoop {
        kind,
        socket,
        sink,
        faults,
        cancel,
        closed,
        counters,
    } = state;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut fault = None;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, _)) => n,
                Err(e) => {
                    fault = Some(format!("receive failed: {}", e));
                    break;
                }
            },
        };

        let mut datagram = &buf[..n];
        let packet = match Packet::unmarshal(&mut datagram) {
            Ok(packet) => packet,
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("{} bridge: skipping {}-byte datagram: {}", kind, n, e);
                continue;
            }
        };

        if let Err(e) = sink.send_packet(&packet).await {
            fault = Some(e.to_string());
            break;
        }
        if counters.forwarded.fetch_add(1, Ordering::Relaxed) == 0 {
            info!(
                "{} bridge: first packet forwarded (ssrc={}, pt={})",
                kind, packet.header.ssrc, packet.header.payload_type
            );
        }
    }

    drop(socket);
    closed.store(true, Ordering::Release);

    if let Some(error) = fault {
        warn!("{} bridge stopped: {}", kind, error);
        if faults.try_send(BridgeFault { kind, error }).is_err() {
            debug!("{} bridge fault not delivered, supervisor gone", kind);
        }
    }
}
