//! Media socket binding

use super::MediaKind;
use crate::config::MediaSocketConfig;
use crate::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Bind a UDP socket for inbound media
///
/// Address reuse is left disabled so a port held by another process (or a
/// leaked earlier session) surfaces as [`Error::ResourceBind`]. Buffer sizing
/// is best effort.
pub fn bind_media_socket(kind: MediaKind, config: &MediaSocketConfig) -> Result<UdpSocket> {
    let addr = config.bind_addr;
    let bind_err = |source: std::io::Error| Error::ResourceBind {
        label: kind.label(),
        addr,
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;

    if let Err(e) = socket.set_recv_buffer_size(config.buffer_bytes) {
        warn!("{} socket: failed to set receive buffer to {}: {}", kind, config.buffer_bytes, e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.buffer_bytes) {
        warn!("{} socket: failed to set send buffer to {}: {}", kind, config.buffer_bytes, e);
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket).map_err(bind_err)?;

    info!(
        buffer_bytes = config.buffer_bytes,
        "{} socket bound on {}",
        kind,
        socket.local_addr().map(|a| a.to_string()).unwrap_or_default()
    );
    Ok(socket)
}
