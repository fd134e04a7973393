//! Once-only session teardown
//!
//! Every terminal source (connection state, ICE state, bridge fault,
//! shutdown) races to fire the same [`CleanupToken`]. The first caller takes
//! the session resources out of the latch and tears them down; everyone else
//! finds the latch already fired and returns immediately.

use super::admission::Admission;
use super::capture::CaptureProcess;
use crate::media::{MediaBridge, MediaKind};
use crate::peer::{StateSource, TransportHandle, TransportState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a session was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Connection or ICE state reached failed, closed, or disconnected
    Transport {
        source: StateSource,
        state: TransportState,
    },
    /// The transport stopped reporting state
    TransportGone,
    /// A media bridge hit a fatal I/O error
    BridgeFault { kind: MediaKind, error: String },
    /// Process shutdown
    Shutdown,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Transport { source, state } => {
                let source = match source {
                    StateSource::Connection => "connection",
                    StateSource::Ice => "ICE",
                };
                write!(f, "{} state {}", source, state)
            }
            TerminationReason::TransportGone => write!(f, "transport event stream closed"),
            TerminationReason::BridgeFault { kind, error } => {
                write!(f, "{} bridge fault: {}", kind, error)
            }
            TerminationReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Resources owned by an active session
pub(crate) struct SessionResources {
    pub capture: Option<CaptureProcess>,
    pub video: Arc<MediaBridge>,
    pub audio: Arc<MediaBridge>,
    pub transport: Arc<dyn TransportHandle>,
    pub admission: Arc<Admission>,
    pub generation: u64,
}

impl SessionResources {
    /// Stop capture, close both sockets, close the transport, release admission
    async fn release(mut self, session_id: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.stop().await;
            debug!(session_id, "Capture stopped");
        }

        self.video.close().await;
        debug!(session_id, "Video socket closed");

        self.audio.close().await;
        debug!(session_id, "Audio socket closed");

        if let Err(e) = self.transport.close().await {
            warn!(session_id, "Transport close failed: {}", e);
        } else {
            debug!(session_id, "Transport closed");
        }

        if self.admission.release(self.generation) {
            info!(session_id, "Admission released");
        } else {
            debug!(
                session_id,
                generation = self.generation,
                "Admission already reset, left untouched"
            );
        }
    }
}

enum Latch {
    Pending(Box<SessionResources>),
    Fired,
}

/// One-shot teardown guard for a session
pub struct CleanupToken {
    session_id: String,
    latch: Mutex<Latch>,
    closed: watch::Sender<bool>,
}

impl CleanupToken {
    pub(crate) fn new(session_id: impl Into<String>, resources: SessionResources) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            session_id: session_id.into(),
            latch: Mutex::new(Latch::Pending(Box::new(resources))),
            closed,
        }
    }

    /// Run teardown if nobody has yet
    ///
    /// Returns `true` for the single caller that performed teardown. Other
    /// callers return `false` without waiting; use [`wait_closed`] to wait for
    /// teardown to finish.
    ///
    /// [`wait_closed`]: CleanupToken::wait_closed
    pub async fn fire(&self, reason: TerminationReason) -> bool {
        let resources = {
            let mut latch = self.latch.lock();
            match std::mem::replace(&mut *latch, Latch::Fired) {
                Latch::Pending(resources) => resources,
                Latch::Fired => {
                    debug!(session_id = %self.session_id, "Cleanup already fired, ignoring {}", reason);
                    return false;
                }
            }
        };

        info!(session_id = %self.session_id, "Tearing down session: {}", reason);
        resources.release(&self.session_id).await;
        self.closed.send_replace(true);
        info!(session_id = %self.session_id, "Session teardown complete");
        true
    }

    pub fn is_fired(&self) -> bool {
        matches!(*self.latch.lock(), Latch::Fired)
    }

    /// True once teardown has completed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until teardown has completed
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
