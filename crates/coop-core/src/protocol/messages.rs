//! Message identifiers and typed payloads of the peer protocol.
//!
//! Every packet exchanged between two cooperating devices starts with a
//! [`MessageId`].  The `Dsoftbus*` ids travel over the device-to-device
//! session; the `Coordination*`/`*AddListener` ids are used for notifications
//! from the service to its local client applications.

use serde::{Deserialize, Serialize};

use crate::domain::coordinate::{Coordinate, NormalizedCoordinate};
use crate::domain::device::InputDevice;
use crate::domain::identity::{Dhid, NetworkId};

/// Prefix of the rendezvous session name; the local network id prefix follows.
pub const SESSION_NAME_PREFIX: &str = "ohos.msdp.device_status.";
/// Number of network-id characters appended to [`SESSION_NAME_PREFIX`].
pub const SESSION_NAME_ID_LEN: usize = 20;

/// Builds the rendezvous session name for the given local network id.
pub fn session_name(local: &NetworkId) -> String {
    let prefix: String = local.as_str().chars().take(SESSION_NAME_ID_LEN).collect();
    format!("{SESSION_NAME_PREFIX}{prefix}")
}

/// Packet type discriminant (first field of the `PackHead`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum MessageId {
    Invalid = 0,
    // ── Service → client notifications ──────────────────────────────────────
    CoordinationAddListener = 1,
    CoordinationMessage = 2,
    CoordinationGetState = 3,
    HotAreaAddListener = 4,
    MouseLocationAddListener = 5,
    // ── Peer ↔ peer ─────────────────────────────────────────────────────────
    DsoftbusSessionBind = 20,
    DsoftbusStartCooperate = 21,
    DsoftbusStartCooperateResponse = 22,
    DsoftbusStartCooperateFinished = 23,
    DsoftbusStopCooperate = 24,
    DsoftbusComeBack = 25,
    DsoftbusRelayCooperate = 26,
    DsoftbusRelayCooperateFinished = 27,
    DsoftbusInputPointerEvent = 28,
    DsoftbusInputKeyEvent = 29,
    DsoftbusInputDevSync = 30,
    DsoftbusInputDevHotPlug = 31,
    DsoftbusSubscribeMouseLocation = 32,
    DsoftbusUnsubscribeMouseLocation = 33,
    DsoftbusReplySubscribeMouseLocation = 34,
    DsoftbusReplyUnsubscribeMouseLocation = 35,
    DsoftbusMouseLocation = 36,
}

impl TryFrom<i32> for MessageId {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let id = match value {
            0 => MessageId::Invalid,
            1 => MessageId::CoordinationAddListener,
            2 => MessageId::CoordinationMessage,
            3 => MessageId::CoordinationGetState,
            4 => MessageId::HotAreaAddListener,
            5 => MessageId::MouseLocationAddListener,
            20 => MessageId::DsoftbusSessionBind,
            21 => MessageId::DsoftbusStartCooperate,
            22 => MessageId::DsoftbusStartCooperateResponse,
            23 => MessageId::DsoftbusStartCooperateFinished,
            24 => MessageId::DsoftbusStopCooperate,
            25 => MessageId::DsoftbusComeBack,
            26 => MessageId::DsoftbusRelayCooperate,
            27 => MessageId::DsoftbusRelayCooperateFinished,
            28 => MessageId::DsoftbusInputPointerEvent,
            29 => MessageId::DsoftbusInputKeyEvent,
            30 => MessageId::DsoftbusInputDevSync,
            31 => MessageId::DsoftbusInputDevHotPlug,
            32 => MessageId::DsoftbusSubscribeMouseLocation,
            33 => MessageId::DsoftbusUnsubscribeMouseLocation,
            34 => MessageId::DsoftbusReplySubscribeMouseLocation,
            35 => MessageId::DsoftbusReplyUnsubscribeMouseLocation,
            36 => MessageId::DsoftbusMouseLocation,
            other => return Err(other),
        };
        Ok(id)
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// First packet on every new session: identifies the connecting peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DSoftbusSessionBind {
    pub network_id: NetworkId,
    pub session_name: String,
}

// ── Cooperation handshake ────────────────────────────────────────────────────

/// Asks the receiver to let the sender's input take over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusStartCooperate {
    /// Sender of the packet.
    pub network_id: NetworkId,
    /// Device whose keyboard and mouse will drive the receiver.
    pub origin_network_id: NetworkId,
    pub success: bool,
    pub cursor_pos: NormalizedCoordinate,
    pub start_device_dhid: Dhid,
    pub flag: u32,
}

/// Receipt acknowledgment of a [`DSoftbusStartCooperate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusStartCooperateResponse {
    pub network_id: NetworkId,
    pub normal: bool,
}

/// Completion of the start handshake, sent by the device entering `IN`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusStartCooperateFinished {
    pub network_id: NetworkId,
    pub origin_network_id: NetworkId,
    pub success: bool,
    pub start_device_dhid: Dhid,
    pub cursor_pos: NormalizedCoordinate,
    pub flag: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusStopCooperate {
    pub network_id: NetworkId,
    pub normal: bool,
}

/// Hands control back to the origin device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusComeBack {
    pub network_id: NetworkId,
    pub origin_network_id: NetworkId,
    pub success: bool,
    pub cursor_pos: NormalizedCoordinate,
}

/// Asks the peer to move the active cooperation to `target_network_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusRelayCooperate {
    pub network_id: NetworkId,
    pub normal: bool,
    pub target_network_id: NetworkId,
}

/// Acknowledges a [`DSoftbusRelayCooperate`]; `normal == false` refuses it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusRelayCooperateFinished {
    pub network_id: NetworkId,
    pub normal: bool,
    pub target_network_id: NetworkId,
}

// ── Input transmission ───────────────────────────────────────────────────────

/// A pointer event captured on the origin device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusPointerEvent {
    pub network_id: NetworkId,
    pub device_id: i32,
    pub pointer_action: i32,
    pub source_type: i32,
    pub button: i32,
    pub position: Coordinate,
    pub delta: Coordinate,
}

/// A key event captured on the origin device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusKeyEvent {
    pub network_id: NetworkId,
    pub device_id: i32,
    pub key_code: i32,
    pub key_action: i32,
}

/// Full list of devices a peer exposes for cooperation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusInputDevSync {
    pub network_id: NetworkId,
    pub devices: Vec<InputDevice>,
}

/// One device change on a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotPlugChange {
    Plug(InputDevice),
    Unplug(i32),
}

impl HotPlugChange {
    /// Wire discriminant: 0 for plug, 1 for unplug.
    pub fn wire_type(&self) -> i32 {
        match self {
            HotPlugChange::Plug(_) => 0,
            HotPlugChange::Unplug(_) => 1,
        }
    }

    pub fn device_id(&self) -> i32 {
        match self {
            HotPlugChange::Plug(dev) => dev.id,
            HotPlugChange::Unplug(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DSoftbusInputDevHotPlug {
    pub network_id: NetworkId,
    pub change: HotPlugChange,
}

// ── Mouse location ───────────────────────────────────────────────────────────

/// Pointer location on a display, reported to mouse-location listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub display_x: i32,
    pub display_y: i32,
    pub display_width: i32,
    pub display_height: i32,
}

/// Subscribe or unsubscribe request for a peer's mouse location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusSubscribeMouseLocation {
    pub network_id: NetworkId,
    pub remote_network_id: NetworkId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusReplyMouseLocation {
    pub network_id: NetworkId,
    pub remote_network_id: NetworkId,
    pub result: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DSoftbusSyncMouseLocation {
    pub network_id: NetworkId,
    pub remote_network_id: NetworkId,
    pub location: LocationInfo,
}

// ── Top-level message enum ───────────────────────────────────────────────────

/// Every packet that can travel over a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    SessionBind(DSoftbusSessionBind),
    StartCooperate(DSoftbusStartCooperate),
    StartCooperateResponse(DSoftbusStartCooperateResponse),
    StartCooperateFinished(DSoftbusStartCooperateFinished),
    StopCooperate(DSoftbusStopCooperate),
    ComeBack(DSoftbusComeBack),
    RelayCooperate(DSoftbusRelayCooperate),
    RelayCooperateFinished(DSoftbusRelayCooperateFinished),
    PointerEvent(DSoftbusPointerEvent),
    KeyEvent(DSoftbusKeyEvent),
    InputDevSync(DSoftbusInputDevSync),
    InputDevHotPlug(DSoftbusInputDevHotPlug),
    SubscribeMouseLocation(DSoftbusSubscribeMouseLocation),
    UnsubscribeMouseLocation(DSoftbusSubscribeMouseLocation),
    ReplySubscribeMouseLocation(DSoftbusReplyMouseLocation),
    ReplyUnsubscribeMouseLocation(DSoftbusReplyMouseLocation),
    MouseLocation(DSoftbusSyncMouseLocation),
}

impl PeerMessage {
    pub fn message_id(&self) -> MessageId {
        match self {
            PeerMessage::SessionBind(_) => MessageId::DsoftbusSessionBind,
            PeerMessage::StartCooperate(_) => MessageId::DsoftbusStartCooperate,
            PeerMessage::StartCooperateResponse(_) => MessageId::DsoftbusStartCooperateResponse,
            PeerMessage::StartCooperateFinished(_) => MessageId::DsoftbusStartCooperateFinished,
            PeerMessage::StopCooperate(_) => MessageId::DsoftbusStopCooperate,
            PeerMessage::ComeBack(_) => MessageId::DsoftbusComeBack,
            PeerMessage::RelayCooperate(_) => MessageId::DsoftbusRelayCooperate,
            PeerMessage::RelayCooperateFinished(_) => MessageId::DsoftbusRelayCooperateFinished,
            PeerMessage::PointerEvent(_) => MessageId::DsoftbusInputPointerEvent,
            PeerMessage::KeyEvent(_) => MessageId::DsoftbusInputKeyEvent,
            PeerMessage::InputDevSync(_) => MessageId::DsoftbusInputDevSync,
            PeerMessage::InputDevHotPlug(_) => MessageId::DsoftbusInputDevHotPlug,
            PeerMessage::SubscribeMouseLocation(_) => MessageId::DsoftbusSubscribeMouseLocation,
            PeerMessage::UnsubscribeMouseLocation(_) => MessageId::DsoftbusUnsubscribeMouseLocation,
            PeerMessage::ReplySubscribeMouseLocation(_) => {
                MessageId::DsoftbusReplySubscribeMouseLocation
            }
            PeerMessage::ReplyUnsubscribeMouseLocation(_) => {
                MessageId::DsoftbusReplyUnsubscribeMouseLocation
            }
            PeerMessage::MouseLocation(_) => MessageId::DsoftbusMouseLocation,
        }
    }

    /// Network id the sender stamped into the payload.
    pub fn sender(&self) -> &NetworkId {
        match self {
            PeerMessage::SessionBind(m) => &m.network_id,
            PeerMessage::StartCooperate(m) => &m.network_id,
            PeerMessage::StartCooperateResponse(m) => &m.network_id,
            PeerMessage::StartCooperateFinished(m) => &m.network_id,
            PeerMessage::StopCooperate(m) => &m.network_id,
            PeerMessage::ComeBack(m) => &m.network_id,
            PeerMessage::RelayCooperate(m) => &m.network_id,
            PeerMessage::RelayCooperateFinished(m) => &m.network_id,
            PeerMessage::PointerEvent(m) => &m.network_id,
            PeerMessage::KeyEvent(m) => &m.network_id,
            PeerMessage::InputDevSync(m) => &m.network_id,
            PeerMessage::InputDevHotPlug(m) => &m.network_id,
            PeerMessage::SubscribeMouseLocation(m) => &m.network_id,
            PeerMessage::UnsubscribeMouseLocation(m) => &m.network_id,
            PeerMessage::ReplySubscribeMouseLocation(m) => &m.network_id,
            PeerMessage::ReplyUnsubscribeMouseLocation(m) => &m.network_id,
            PeerMessage::MouseLocation(m) => &m.network_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_try_from_round_trips_every_variant() {
        for raw in [0, 1, 2, 3, 4, 5, 20, 25, 30, 36] {
            let id = MessageId::try_from(raw).expect("known id");
            assert_eq!(id as i32, raw);
        }
    }

    #[test]
    fn test_message_id_try_from_rejects_unknown_value() {
        assert_eq!(MessageId::try_from(999), Err(999));
        assert_eq!(MessageId::try_from(-3), Err(-3));
    }

    #[test]
    fn test_session_name_truncates_network_id_prefix() {
        // Arrange
        let local = NetworkId::from("0123456789abcdefghijKLMNOP");

        // Act
        let name = session_name(&local);

        // Assert
        assert_eq!(name, "ohos.msdp.device_status.0123456789abcdefghij");
    }

    #[test]
    fn test_hot_plug_change_wire_type() {
        assert_eq!(HotPlugChange::Plug(InputDevice::default()).wire_type(), 0);
        assert_eq!(HotPlugChange::Unplug(7).wire_type(), 1);
        assert_eq!(HotPlugChange::Unplug(7).device_id(), 7);
    }
}
