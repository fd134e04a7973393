//! Negotiation bridge over the webrtc-rs engine
//!
//! Builds a peer connection with one outbound H.264 video track and one
//! outbound Opus audio track, applies the browser offer, and returns the
//! answer only after ICE gathering has completed. Connection and ICE state
//! transitions are multiplexed onto a single event channel.

use super::locality::LocalityPolicy;
use crate::media::RtpSink;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

/// Capacity of the state-change event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Stream id shared by both outbound tracks
const STREAM_ID: &str = "mediarelay";

/// Which state machine produced a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    /// Overall peer connection state
    Connection,
    /// ICE transport sub-state
    Ice,
}

/// Unified view over peer-connection and ICE states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Checking,
    Connecting,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
    Unspecified,
}

impl TransportState {
    /// Failed, closed, and disconnected end the session
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportState::New => "new",
            TransportState::Checking => "checking",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Completed => "completed",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
            TransportState::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => TransportState::New,
            RTCPeerConnectionState::Connecting => TransportState::Connecting,
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            RTCPeerConnectionState::Closed => TransportState::Closed,
            _ => TransportState::Unspecified,
        }
    }
}

impl From<RTCIceConnectionState> for TransportState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::New => TransportState::New,
            RTCIceConnectionState::Checking => TransportState::Checking,
            RTCIceConnectionState::Connected => TransportState::Connected,
            RTCIceConnectionState::Completed => TransportState::Completed,
            RTCIceConnectionState::Disconnected => TransportState::Disconnected,
            RTCIceConnectionState::Failed => TransportState::Failed,
            RTCIceConnectionState::Closed => TransportState::Closed,
            _ => TransportState::Unspecified,
        }
    }
}

/// A single state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportEvent {
    pub source: StateSource,
    pub state: TransportState,
}

impl TransportEvent {
    pub fn connection(state: impl Into<TransportState>) -> Self {
        Self {
            source: StateSource::Connection,
            state: state.into(),
        }
    }

    pub fn ice(state: impl Into<TransportState>) -> Self {
        Self {
            source: StateSource::Ice,
            state: state.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Handle on the negotiated transport, owned by the active session
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Close the transport
    async fn close(&self) -> Result<()>;
}

/// Everything a successful negotiation hands back to the coordinator
pub struct NegotiatedTransport {
    /// Local answer with all gathered candidates
    pub answer: RTCSessionDescription,

    /// Transport handle, closed by session cleanup
    pub handle: Arc<dyn TransportHandle>,

    /// Outbound video track
    pub video_track: Arc<dyn RtpSink>,

    /// Outbound audio track
    pub audio_track: Arc<dyn RtpSink>,

    /// Connection and ICE state transitions
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Accept an offer, produce an answer, emit state-change events
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Negotiate a transport for `offer` under `policy`
    ///
    /// Setup failures are not retried. A partially built transport is closed
    /// before the error is returned.
    async fn negotiate(
        &self,
        offer: RTCSessionDescription,
        policy: &LocalityPolicy,
    ) -> Result<NegotiatedTransport>;
}

/// Peer connection wrapper implementing [`TransportHandle`]
pub struct PeerTransport {
    peer_connection: Arc<RTCPeerConnection>,
}

impl PeerTransport {
    /// Get the underlying WebRTC peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl TransportHandle for PeerTransport {
    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::TransportFault(format!("Failed to close peer connection: {}", e)))
    }
}

/// [`Negotiator`] backed by webrtc-rs
#[derive(Debug, Default, Clone)]
pub struct WebRtcNegotiator;

impl WebRtcNegotiator {
    pub fn new() -> Self {
        Self
    }

    fn build_api(policy: &LocalityPolicy) -> Result<API> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::negotiation("media_engine", e))?;

        let interceptor_registry =
            register_default_interceptors(Registry::new(), &mut media_engine)
                .map_err(|e| Error::negotiation("interceptors", e))?;

        let mut settings = SettingEngine::default();
        if let Some(range) = policy.port_range {
            let udp = EphemeralUDP::new(range.min, range.max)
                .map_err(|e| Error::negotiation("setting_engine", e))?;
            settings.set_udp_network(UDPNetwork::Ephemeral(udp));
        }
        if policy.include_loopback {
            settings.set_include_loopback_candidate(true);
        }

        Ok(APIBuilder::new()
            .with_setting_engine(settings)
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build())
    }

    fn rtc_configuration(policy: &LocalityPolicy) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: policy
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ice_transport_policy: RTCIceTransportPolicy::All,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        }
    }
}

fn outbound_track(mime_type: &str, kind: &str) -> Arc<TrackLocalStaticRTP> {
    Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: mime_type.to_string(),
            ..Default::default()
        },
        kind.to_string(),
        STREAM_ID.to_string(),
    ))
}

async fn add_track(
    peer_connection: &RTCPeerConnection,
    track: &Arc<TrackLocalStaticRTP>,
    stage: &'static str,
) -> Result<()> {
    let sender = peer_connection
        .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| Error::negotiation(stage, e))?;

    // Interceptors only run while RTCP is being read
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
        debug!("RTCP reader exited for {}", stage);
    });

    Ok(())
}

type HandlerFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Forward one state event from an engine callback
///
/// Non-terminal transitions are dropped when the channel is full. Terminal
/// ones wait for room, since they are what drives session cleanup.
fn forward_state_event(tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) -> HandlerFuture {
    match tx.try_send(event) {
        Ok(()) => Box::pin(async {}),
        Err(mpsc::error::TrySendError::Full(event)) if event.is_terminal() => {
            warn!(
                source = ?event.source,
                "State event channel full, waiting to deliver terminal state {}",
                event.state
            );
            let tx = tx.clone();
            Box::pin(async move {
                if tx.send(event).await.is_err() {
                    debug!("Terminal state event not delivered, supervisor gone");
                }
            })
        }
        Err(mpsc::error::TrySendError::Full(event)) => {
            debug!(source = ?event.source, "Dropped state event {}", event.state);
            Box::pin(async {})
        }
        Err(mpsc::error::TrySendError::Closed(event)) => {
            debug!(source = ?event.source, "State event {} after supervisor exit", event.state);
            Box::pin(async {})
        }
    }
}

fn attach_state_handlers(
    peer_connection: &RTCPeerConnection,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    let connection_tx = events_tx.clone();
    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            forward_state_event(&connection_tx, TransportEvent::connection(state))
        },
    ));

    let ice_tx = events_tx;
    peer_connection.on_ice_connection_state_change(Box::new(
        move |state: RTCIceConnectionState| {
            forward_state_event(&ice_tx, TransportEvent::ice(state))
        },
    ));
}

async fn exchange_descriptions(
    peer_connection: &RTCPeerConnection,
    offer: RTCSessionDescription,
) -> Result<RTCSessionDescription> {
    peer_connection
        .set_remote_description(offer)
        .await
        .map_err(|e| Error::negotiation("set_remote_description", e))?;

    let answer = peer_connection
        .create_answer(None)
        .await
        .map_err(|e| Error::negotiation("create_answer", e))?;

    let mut gather_complete = peer_connection.gathering_complete_promise().await;

    peer_connection
        .set_local_description(answer)
        .await
        .map_err(|e| Error::negotiation("set_local_description", e))?;

    let _ = gather_complete.recv().await;
    debug!("ICE gathering complete");

    peer_connection
        .local_description()
        .await
        .ok_or_else(|| Error::negotiation("local_description", "no local description after gathering"))
}

#[async_trait]
impl Negotiator for WebRtcNegotiator {
    #[instrument(skip(self, offer, policy), fields(locality = %policy.locality))]
    async fn negotiate(
        &self,
        offer: RTCSessionDescription,
        policy: &LocalityPolicy,
    ) -> Result<NegotiatedTransport> {
        info!(
            ice_servers = policy.ice_servers.len(),
            port_range = ?policy.port_range,
            "Initializing WebRTC session"
        );

        let api = Self::build_api(policy)?;
        let peer_connection = Arc::new(
            api.new_peer_connection(Self::rtc_configuration(policy))
                .await
                .map_err(|e| Error::negotiation("peer_connection", e))?,
        );

        let video_track = outbound_track(MIME_TYPE_H264, "video");
        let audio_track = outbound_track(MIME_TYPE_OPUS, "audio");
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let built = async {
            add_track(&peer_connection, &video_track, "add_video_track").await?;
            add_track(&peer_connection, &audio_track, "add_audio_track").await?;
            attach_state_handlers(&peer_connection, events_tx);
            exchange_descriptions(&peer_connection, offer).await
        }
        .await;

        let answer = match built {
            Ok(answer) => answer,
            Err(e) => {
                if let Err(close_err) = peer_connection.close().await {
                    warn!("Failed to close partial peer connection: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            candidates = answer.sdp.matches("a=candidate:").count(),
            "WebRTC session negotiated"
        );

        Ok(NegotiatedTransport {
            answer,
            handle: Arc::new(PeerTransport { peer_connection }),
            video_track,
            audio_track,
            events,
        })
    }
}
