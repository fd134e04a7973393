//! Offer/answer blob codec
//!
//! Browsers post `base64(JSON.stringify(pc.localDescription))` and expect the
//! answer back in the same shape.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Decode a base64 JSON session description and require it to be an offer
pub fn decode_offer(blob: &str) -> Result<RTCSessionDescription> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|e| Error::MalformedOffer(format!("invalid base64: {}", e)))?;

    let description: RTCSessionDescription = serde_json::from_slice(&raw)
        .map_err(|e| Error::MalformedOffer(format!("invalid session description: {}", e)))?;

    if description.sdp_type != RTCSdpType::Offer {
        return Err(Error::MalformedOffer(format!(
            "expected an offer, got {}",
            description.sdp_type
        )));
    }
    if description.sdp.trim().is_empty() {
        return Err(Error::MalformedOffer("offer has an empty SDP".to_string()));
    }

    Ok(description)
}

/// Encode a session description as base64 JSON
pub fn encode_description(description: &RTCSessionDescription) -> Result<String> {
    let json = serde_json::to_vec(description)
        .map_err(|e| Error::Other(anyhow::anyhow!("failed to serialize description: {}", e)))?;
    Ok(STANDARD.encode(json))
}
