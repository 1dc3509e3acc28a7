//! Peer protocol: message ids, typed payloads and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_peer_message, encode_peer_message, NetPacket, PackHead, ProtocolError};
pub use messages::{MessageId, PeerMessage};
