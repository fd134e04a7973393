//! Session lifecycle coordinator
//!
//! Drives admission, negotiation, bridge allocation, and capture launch for
//! the single streaming session, and spawns a supervisor per session that
//! funnels every terminal source into the session's [`CleanupToken`].

use super::admission::Admission;
use super::capture::CaptureProcess;
use super::cleanup::{CleanupToken, SessionResources, TerminationReason};
use crate::config::SessionConfig;
use crate::media::{BridgeFault, MediaBridge, MediaKind};
use crate::peer::{
    Locality, LocalityPolicy, NegotiatedTransport, Negotiator, TransportEvent, TransportHandle,
    WebRtcNegotiator,
};
use crate::Result;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Two bridges, one fault each at most
const FAULT_CHANNEL_CAPACITY: usize = 4;

/// Successful session start
#[derive(Debug, Clone)]
pub struct SessionAnswer {
    pub session_id: Uuid,
    /// Local description with gathering complete
    pub answer: RTCSessionDescription,
    pub locality: Locality,
}

/// Handle on the currently streaming session
pub struct ActiveSession {
    id: Uuid,
    locality: Locality,
    started_at: Instant,
    video: Arc<MediaBridge>,
    audio: Arc<MediaBridge>,
    cleanup: Arc<CleanupToken>,
}

impl ActiveSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn locality(&self) -> Locality {
        self.locality
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn video_addr(&self) -> SocketAddr {
        self.video.local_addr()
    }

    pub fn audio_addr(&self) -> SocketAddr {
        self.audio.local_addr()
    }

    /// True once both datagram sockets have been released
    pub fn sockets_closed(&self) -> bool {
        self.video.is_closed() && self.audio.is_closed()
    }

    pub fn cleanup(&self) -> &Arc<CleanupToken> {
        &self.cleanup
    }

    /// Tear the session down; returns `false` if it was already torn down
    pub async fn terminate(&self, reason: TerminationReason) -> bool {
        self.cleanup.fire(reason).await
    }

    pub async fn wait_closed(&self) {
        self.cleanup.wait_closed().await
    }
}

type ActiveSlot = Arc<Mutex<Option<Arc<ActiveSession>>>>;

/// Owner of the admission gate and the active session
pub struct SessionCoordinator {
    config: SessionConfig,
    negotiator: Arc<dyn Negotiator>,
    admission: Arc<Admission>,
    active: ActiveSlot,
}

impl SessionCoordinator {
    /// Create a coordinator around any negotiation engine
    pub fn new(config: SessionConfig, negotiator: Arc<dyn Negotiator>) -> Self {
        Self {
            config,
            negotiator,
            admission: Arc::new(Admission::new()),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a coordinator backed by the webrtc-rs engine
    pub fn with_webrtc(config: SessionConfig) -> Self {
        Self::new(config, Arc::new(WebRtcNegotiator::new()))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True while a committed session holds the admission gate
    pub fn in_progress(&self) -> bool {
        self.admission.in_progress()
    }

    /// True while any session holds or is acquiring the gate
    pub fn is_busy(&self) -> bool {
        self.admission.is_held()
    }

    pub fn active_session(&self) -> Option<Arc<ActiveSession>> {
        self.active.lock().clone()
    }

    /// Admit, negotiate, and start bridging a new session
    ///
    /// `caller_host` is the identifier used for locality classification
    /// (the `Host` the browser used, or the peer address).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInProgress`](crate::Error::AlreadyInProgress) if a
    ///   session holds the gate
    /// - negotiation, bind, and capture failures, after rolling back every
    ///   resource allocated so far
    pub async fn start_session(
        &self,
        offer: RTCSessionDescription,
        caller_host: &str,
    ) -> Result<SessionAnswer> {
        let generation = self.admission.try_reserve().inspect_err(|_| {
            warn!("Rejecting session start: stream already in progress");
        })?;

        let policy = LocalityPolicy::for_caller(caller_host, &self.config.negotiation);
        info!(
            caller = caller_host,
            locality = %policy.locality,
            stun_servers = policy.ice_servers.len(),
            "Session offer received"
        );

        let negotiated = match self.negotiator.negotiate(offer, &policy).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                error!("Negotiation failed: {}", e);
                self.admission.abandon(generation);
                return Err(e);
            }
        };

        let NegotiatedTransport {
            answer,
            handle: transport,
            video_track,
            audio_track,
            events,
        } = negotiated;

        let (fault_tx, fault_rx) = mpsc::channel(FAULT_CHANNEL_CAPACITY);

        let video = match MediaBridge::start(
            MediaKind::Video,
            &self.config.video,
            video_track,
            fault_tx.clone(),
        ) {
            Ok(bridge) => Arc::new(bridge),
            Err(e) => {
                self.roll_back(generation, &transport, &[], None, &e).await;
                return Err(e);
            }
        };

        let audio = match MediaBridge::start(
            MediaKind::Audio,
            &self.config.audio,
            audio_track,
            fault_tx,
        ) {
            Ok(bridge) => Arc::new(bridge),
            Err(e) => {
                self.roll_back(generation, &transport, &[&video], None, &e).await;
                return Err(e);
            }
        };

        let capture = if self.config.capture.enabled {
            match CaptureProcess::spawn(&self.config.capture) {
                Ok(capture) => Some(capture),
                Err(e) => {
                    self.roll_back(generation, &transport, &[&video, &audio], None, &e)
                        .await;
                    return Err(e);
                }
            }
        } else {
            debug!("Capture disabled, expecting an external RTP source");
            None
        };

        if let Err(e) = self.admission.commit(generation) {
            self.roll_back(generation, &transport, &[&video, &audio], capture, &e)
                .await;
            return Err(e);
        }

        let session_id = Uuid::new_v4();
        let cleanup = Arc::new(CleanupToken::new(
            session_id.to_string(),
            SessionResources {
                capture,
                video: Arc::clone(&video),
                audio: Arc::clone(&audio),
                transport,
                admission: Arc::clone(&self.admission),
                generation,
            },
        ));

        let session = Arc::new(ActiveSession {
            id: session_id,
            locality: policy.locality,
            started_at: Instant::now(),
            video,
            audio,
            cleanup,
        });

        *self.active.lock() = Some(Arc::clone(&session));
        tokio::spawn(supervise(
            Arc::clone(&session),
            events,
            fault_rx,
            Arc::clone(&self.active),
        ));

        info!(
            session_id = %session_id,
            locality = %policy.locality,
            video = %session.video_addr(),
            audio = %session.audio_addr(),
            "Session streaming"
        );

        Ok(SessionAnswer {
            session_id,
            answer,
            locality: policy.locality,
        })
    }

    /// Clear the admission flag unconditionally
    ///
    /// Does not touch the transport, sockets, or capture process of whatever
    /// session set the flag. That session keeps running until one of its own
    /// terminal events fires, and its eventual cleanup will not clear the
    /// flag of a newer session. Returns whether the flag was set.
    pub fn force_reset(&self) -> bool {
        let was_set = self.admission.force_reset();
        warn!(was_set, "Admission state force-reset by operator");
        was_set
    }

    /// Tear down the active session, if any, and wait for it to finish
    pub async fn shutdown(&self) {
        let session = self.active.lock().take();
        if let Some(session) = session {
            info!(session_id = %session.id(), "Shutting down active session");
            session.terminate(TerminationReason::Shutdown).await;
            session.wait_closed().await;
        }
    }

    async fn roll_back(
        &self,
        generation: u64,
        transport: &Arc<dyn TransportHandle>,
        bridges: &[&Arc<MediaBridge>],
        capture: Option<CaptureProcess>,
        cause: &crate::Error,
    ) {
        warn!(stage = ?cause.stage(), "Session setup failed, rolling back: {}", cause);

        if let Some(mut capture) = capture {
            capture.stop().await;
        }
        for bridge in bridges {
            bridge.close().await;
        }
        if let Err(e) = transport.close().await {
            warn!("Failed to close transport during rollback: {}", e);
        }
        self.admission.abandon(generation);
    }
}

async fn supervise(
    session: Arc<ActiveSession>,
    mut events: mpsc::Receiver<TransportEvent>,
    mut faults: mpsc::Receiver<BridgeFault>,
    active: ActiveSlot,
) {
    let session_id = session.id();
    let cleanup = Arc::clone(session.cleanup());

    let reason = loop {
        tokio::select! {
            _ = cleanup.wait_closed() => break None,
            event = events.recv() => match event {
                Some(event) if event.is_terminal() => {
                    break Some(TerminationReason::Transport {
                        source: event.source,
                        state: event.state,
                    });
                }
                Some(event) => {
                    info!(session_id = %session_id, source = ?event.source, "Transport state: {}", event.state);
                }
                None => break Some(TerminationReason::TransportGone),
            },
            Some(fault) = faults.recv() => {
                break Some(TerminationReason::BridgeFault {
                    kind: fault.kind,
                    error: fault.error,
                });
            }
        }
    };

    if let Some(reason) = reason {
        cleanup.fire(reason).await;
    }

    let mut slot = active.lock();
    if slot.as_ref().is_some_and(|s| s.id() == session_id) {
        *slot = None;
    }
    debug!(session_id = %session_id, "Session supervisor exited");
}
