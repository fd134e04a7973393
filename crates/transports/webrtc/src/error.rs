//! Error types for session negotiation and media bridging

use std::net::SocketAddr;

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while admitting, negotiating, or tearing down a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A streaming session is already active (or being set up)
    #[error("Stream already in progress")]
    AlreadyInProgress,

    /// The offer blob could not be decoded
    #[error("Malformed offer: {0}")]
    MalformedOffer(String),

    /// A negotiation construction step failed
    #[error("Negotiation failed at {stage}: {message}")]
    Negotiation {
        /// Name of the failing construction step
        stage: &'static str,
        /// Underlying engine error
        message: String,
    },

    /// A media datagram socket could not be bound
    #[error("{label} UDP port {addr} in use: {source}")]
    ResourceBind {
        /// Media kind label ("Video" / "Audio")
        label: &'static str,
        /// Address that failed to bind
        addr: SocketAddr,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// External capture process could not be launched
    #[error("Capture process error: {0}")]
    Capture(String),

    /// The admission reservation was force-reset while the session was still being set up
    #[error("Session admission was reset during setup")]
    AdmissionLost,

    /// Post-setup transport failure (terminal state or bridge I/O)
    #[error("Transport fault: {0}")]
    TransportFault(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn negotiation(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Negotiation {
            stage,
            message: err.to_string(),
        }
    }

    /// Check if this error is an admission conflict (service busy)
    pub fn is_admission_conflict(&self) -> bool {
        matches!(self, Error::AlreadyInProgress)
    }

    /// Check if this error was caused by caller input
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Error::MalformedOffer(_))
    }

    /// Check if this error happened during session setup and was rolled back
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::Negotiation { .. }
                | Error::ResourceBind { .. }
                | Error::Capture(_)
                | Error::AdmissionLost
        )
    }

    /// Name of the setup stage that failed, if any
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Error::Negotiation { stage, .. } => Some(stage),
            Error::ResourceBind { .. } => Some("bind"),
            Error::Capture(_) => Some("capture"),
            _ => None,
        }
    }
}
