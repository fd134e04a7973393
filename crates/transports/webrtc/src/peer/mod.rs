//! Peer negotiation: locality policy, offer/answer codec, and the WebRTC engine bridge

mod codec;
mod locality;
mod negotiator;

pub use codec::{decode_offer, encode_description};
pub use locality::{Locality, LocalityPolicy, PortRange};
pub use negotiator::{
    NegotiatedTransport, Negotiator, PeerTransport, StateSource, TransportEvent, TransportHandle,
    TransportState, WebRtcNegotiator,
};
