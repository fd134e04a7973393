//! HTTP surface and subscriber broadcast hub for the MediaRelay gateway
//!
//! # Features
//!
//! - **Session start**: offer blob in, answer blob out via POST /session/start
//! - **Operator reset**: clear admission state via GET or POST /session/reset
//! - **Caption fan-out**: POST /events/publish to every WebSocket subscriber on GET /ws
//! - **Host telemetry**: GET /status
//! - **Health checks**: GET /health
//!
//! # Usage
//!
//! ```ignore
//! use mediarelay_http::{AppState, BroadcastHub, GatewayServer};
//! use mediarelay_host_status::HostStatusProbe;
//! use mediarelay_webrtc::{SessionConfig, SessionCoordinator};
//!
//! let coordinator = Arc::new(SessionCoordinator::with_webrtc(SessionConfig::new()));
//! let hub = BroadcastHub::spawn(256);
//! let state = AppState::new(coordinator, hub, Arc::new(HostStatusProbe::new()));
//!
//! GatewayServer::new("0.0.0.0:8080".parse()?, state)
//!     .serve(shutdown_signal())
//!     .await?;
//! ```

pub mod error;
pub mod events;
pub mod hub;
pub mod server;

// Re-export main types
pub use error::{Error, ErrorResponse, Result};
pub use events::SubtitleEvent;
pub use hub::{BroadcastHub, PumpExit, PumpTimings, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use server::{router, AppState, GatewayServer, HealthResponse};
