//! HTTP server for the gateway
//!
//! Provides the endpoints:
//! - POST /session/start - Offer blob in, answer blob out
//! - GET|POST /session/reset - Operator admission reset
//! - POST /events/publish - Broadcast a caption event
//! - GET /status - Host telemetry snapshot
//! - GET /health - Health check
//! - GET /ws - Subscriber WebSocket

use crate::error::{Error, Result};
use crate::events::SubtitleEvent;
use crate::hub::{serve_subscriber, BroadcastHub, PumpTimings};
use axum::{
    body::Bytes,
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use mediarelay_host_status::{HostStatusProbe, SystemStatus};
use mediarelay_webrtc::{decode_offer, encode_description, SessionCoordinator};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared state across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub hub: BroadcastHub,
    pub status: Arc<HostStatusProbe>,
    pub timings: PumpTimings,
}

impl AppState {
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        hub: BroadcastHub,
        status: Arc<HostStatusProbe>,
    ) -> Self {
        Self {
            coordinator,
            hub,
            status,
            timings: PumpTimings::default(),
        }
    }
}

/// Gateway HTTP server
pub struct GatewayServer {
    bind_address: SocketAddr,
    state: AppState,
}

impl GatewayServer {
    pub fn new(bind_address: SocketAddr, state: AppState) -> Self {
        Self {
            bind_address,
            state,
        }
    }

    /// Build the router with all endpoints
    pub fn build_router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| Error::ServerError(format!("Failed to bind {}: {}", self.bind_address, e)))?;

        info!("Gateway listening on {}", self.bind_address);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::ServerError(format!("Server error: {}", e)))?;

        info!("Gateway stopped accepting connections");
        Ok(())
    }
}

/// Router over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session/start", post(start_session_handler))
        .route("/session/reset", get(reset_handler).post(reset_handler))
        .route("/events/publish", post(publish_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
}

/// Locality input: the Host the browser used, else the TCP peer
fn caller_host(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

async fn start_session_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: String,
) -> Result<String> {
    let started = Instant::now();
    info!("Stream request received");

    if state.coordinator.is_busy() {
        return Err(mediarelay_webrtc::Error::AlreadyInProgress.into());
    }

    let offer = decode_offer(&body)?;
    let caller = caller_host(&headers, peer.map(|ConnectInfo(addr)| addr));

    let session = state.coordinator.start_session(offer, &caller).await?;
    let answer = encode_description(&session.answer)?;

    info!(
        session_id = %session.session_id,
        locality = %session.locality,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stream started"
    );
    Ok(answer)
}

async fn reset_handler(State(state): State<AppState>) -> &'static str {
    let was_set = state.coordinator.force_reset();
    info!(was_set, "Stream state reset by client request");
    "OK - Stream state reset"
}

async fn publish_handler(State(state): State<AppState>, body: Bytes) -> Result<&'static str> {
    let event = SubtitleEvent::from_body(&body)?;
    state.hub.publish(event.to_message()?).await?;

    info!(
        "Received subtitle: {} [{}] [Speaker {}] {}",
        event.lang_code, event.emoji, event.speaker, event.text
    );
    Ok("OK")
}

async fn status_handler(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(state.status.snapshot().await)
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_in_progress: bool,
    pub subscribers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscribers = match state.hub.subscriber_count().await {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to count subscribers: {}", e);
            0
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        session_in_progress: state.coordinator.in_progress(),
        subscribers,
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let timings = state.timings;
    ws.max_message_size(timings.max_message_bytes)
        .on_upgrade(move |socket| handle_subscriber(socket, state.hub, timings))
}

async fn handle_subscriber(socket: WebSocket, hub: BroadcastHub, timings: PumpTimings) {
    let subscription = match hub.register().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Rejecting subscriber: {}", e);
            return;
        }
    };

    let (sink, stream) = socket.split();
    serve_subscriber(sink, stream, subscription, timings).await;
}
