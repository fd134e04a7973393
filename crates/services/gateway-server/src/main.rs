//! Gateway binary entry point
//!
//! Serves the MediaRelay HTTP surface, admits one browser streaming session
//! at a time, and relays local RTP into it.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:8080, RTP on 5004/5006)
//! cargo run -p mediarelay-server
//!
//! # RTP produced by something else on the host
//! GST_MODE=external RTP_PORT=6004 cargo run -p mediarelay-server
//!
//! # With logging
//! RUST_LOG=debug cargo run -p mediarelay-server
//! ```

use anyhow::Context;
use clap::Parser;
use mediarelay_host_status::HostStatusProbe;
use mediarelay_http::{AppState, BroadcastHub, GatewayServer};
use mediarelay_webrtc::config::default_capture_args;
use mediarelay_webrtc::{
    CaptureConfig, MediaSocketConfig, NegotiationConfig, SessionConfig, SessionCoordinator,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MediaRelay gateway
///
/// Single-session WebRTC gateway with caption broadcast and host telemetry.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen address (`:8080` binds all interfaces)
    #[arg(long, default_value = "0.0.0.0:8080", env = "HTTP_ADDR")]
    http_addr: String,

    /// Bind IP for the video and audio datagram sockets
    #[arg(long, default_value = "0.0.0.0", env = "RTP_BIND_IP")]
    rtp_bind_ip: IpAddr,

    /// Video RTP port
    #[arg(long, default_value_t = 5004, env = "RTP_PORT")]
    rtp_port: u16,

    /// Audio RTP port
    #[arg(long, default_value_t = 5006, env = "RTP_AUDIO_PORT")]
    rtp_audio_port: u16,

    /// Receive and send buffer size for media sockets
    #[arg(long, default_value_t = 2 * 1024 * 1024, env = "RTP_SOCKET_BUFFER")]
    socket_buffer_bytes: usize,

    /// 'external' when another process already produces RTP
    #[arg(long, default_value = "local", env = "GST_MODE")]
    gst_mode: String,

    /// Capture executable launched per session
    #[arg(long, default_value = "gst-launch-1.0", env = "CAPTURE_PROGRAM")]
    capture_program: String,

    /// Whitespace-separated capture arguments (default: camera pipeline to the video port)
    #[arg(long, env = "CAPTURE_ARGS")]
    capture_args: Option<String>,

    /// STUN servers for non-local callers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Lowest ICE port for local callers
    #[arg(long, default_value_t = 50000, env = "WEBRTC_LOCAL_PORT_MIN")]
    local_port_min: u16,

    /// Highest ICE port for local callers
    #[arg(long, default_value_t = 50100, env = "WEBRTC_LOCAL_PORT_MAX")]
    local_port_max: u16,

    /// Per-subscriber caption queue bound
    #[arg(long, default_value_t = 256, env = "HUB_QUEUE_CAPACITY")]
    hub_queue_capacity: usize,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let socket = |port| MediaSocketConfig {
            bind_addr: SocketAddr::new(self.rtp_bind_ip, port),
            buffer_bytes: self.socket_buffer_bytes,
        };

        let args = match &self.capture_args {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => default_capture_args(self.rtp_port),
        };

        SessionConfig {
            negotiation: NegotiationConfig {
                stun_servers: self
                    .stun_servers
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                local_port_min: self.local_port_min,
                local_port_max: self.local_port_max,
            },
            video: socket(self.rtp_port),
            audio: socket(self.rtp_audio_port),
            capture: CaptureConfig {
                enabled: !self.gst_mode.eq_ignore_ascii_case("external"),
                program: self.capture_program.clone(),
                args,
            },
        }
    }
}

/// Accept `:8080` as shorthand for all interfaces
fn parse_http_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    let raw = raw.trim();
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid HTTP listen address '{}'", raw))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up Ctrl+C handler before anything else
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signalled = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if signalled.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(1);
        }
        eprintln!("Ctrl+C received, shutting down");
        let _ = shutdown_tx.send(true);
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("mediarelay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_rx))
}

async fn async_main(args: Args, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    init_tracing();

    let bind_address = parse_http_addr(&args.http_addr)?;
    let config = args.session_config();
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        http = %bind_address,
        video = %config.video.bind_addr,
        audio = %config.audio.bind_addr,
        capture = config.capture.enabled,
        stun_servers = config.negotiation.stun_servers.len(),
        "MediaRelay gateway starting"
    );

    let coordinator = Arc::new(SessionCoordinator::with_webrtc(config));
    let hub = BroadcastHub::spawn(args.hub_queue_capacity);
    let state = AppState::new(
        Arc::clone(&coordinator),
        hub,
        Arc::new(HostStatusProbe::new()),
    );

    let served = GatewayServer::new(bind_address, state)
        .serve(wait_for_shutdown(shutdown))
        .await;

    info!("Tearing down active session");
    coordinator.shutdown().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Gateway shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shut down
    let _ = shutdown.wait_for(|stop| *stop).await;
    info!("Shutdown signal received, stopping HTTP server");
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
