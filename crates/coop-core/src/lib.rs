//! # coop-core
//!
//! Shared library for the cooperate service containing the peer-to-peer wire
//! protocol, the identifier newtypes, cursor coordinate math and the input
//! device model.
//!
//! It has zero dependencies on OS APIs, async runtimes or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! "Cooperate" lets the mouse and keyboard of one device drive a second,
//! paired device.  When cooperation starts, the local pointer is hidden and
//! every local input event is forwarded to the peer, which injects it into its
//! own input pipeline.  Control can later come back, or be relayed to a third
//! device.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`domain`** – Identifiers (`NetworkId`, `Dhid`), normalised cursor
//!   coordinates, and the `InputDevice` record together with the stable
//!   device-hash id ("dhid") algorithm.
//!
//! - **`protocol`** – How bytes travel between peers.  Every packet is a
//!   `PackHead` (message id + payload size) followed by a payload whose field
//!   order is fixed by the encode/decode helpers in `codec`.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `coop_core::NetworkId` instead of `coop_core::domain::identity::NetworkId`.
pub use domain::coordinate::{Coordinate, DisplayInfo, NormalizedCoordinate};
pub use domain::device::{InputDevice, KeyboardType};
pub use domain::identity::{Dhid, NetworkId};
pub use protocol::codec::{NetPacket, ProtocolError};
pub use protocol::messages::MessageId;
