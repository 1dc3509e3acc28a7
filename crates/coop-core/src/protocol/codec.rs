//! Binary codec for packets exchanged between cooperating peers.
//!
//! Wire format:
//! ```text
//! [msg_id:4][size:4][payload:size]
//! ```
//! The 8-byte prefix is the `PackHead`.  All multi-byte integers are
//! big-endian.  Strings are a 2-byte length followed by UTF-8 bytes and
//! booleans are a single `0`/`1` byte.
//!
//! Field order inside each payload is fixed by the `encode_*`/`decode_*`
//! helpers below and must match exactly between sender and receiver: there is
//! no schema negotiation.

use thiserror::Error;

use crate::domain::coordinate::{Coordinate, NormalizedCoordinate};
use crate::domain::device::{InputDevice, KeyboardType};
use crate::domain::identity::{Dhid, NetworkId};
use crate::protocol::messages::{
    DSoftbusComeBack, DSoftbusInputDevHotPlug, DSoftbusInputDevSync, DSoftbusKeyEvent,
    DSoftbusPointerEvent, DSoftbusRelayCooperate, DSoftbusRelayCooperateFinished,
    DSoftbusReplyMouseLocation, DSoftbusSessionBind, DSoftbusStartCooperate,
    DSoftbusStartCooperateFinished, DSoftbusStartCooperateResponse, DSoftbusStopCooperate,
    DSoftbusSubscribeMouseLocation, DSoftbusSyncMouseLocation, HotPlugChange, LocationInfo,
    MessageId, PeerMessage,
};

/// Size of the `PackHead` prefix in bytes.
pub const PACK_HEAD_SIZE: usize = 8;
/// Largest payload accepted from a peer.
pub const MAX_PACKET_SIZE: usize = 64 * 1024;
/// Upper bound of devices accepted in a single sync packet.
const MAX_SYNC_DEVICES: i32 = 100;

/// Errors that can occur during packet encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message id in the head is not a recognized value.
    #[error("unknown message id: {0}")]
    UnknownMessageType(i32),

    /// The message id is known but never travels between peers.
    #[error("message id {0:?} is not a peer message")]
    NotPeerMessage(MessageId),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The size field of the head is negative or exceeds [`MAX_PACKET_SIZE`].
    #[error("invalid payload size {0}")]
    InvalidPayloadSize(i32),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: head says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Packet framing ───────────────────────────────────────────────────────────

/// Decoded `PackHead`: raw message id plus validated payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHead {
    pub msg_id: i32,
    pub size: usize,
}

impl PackHead {
    /// Parses the 8-byte head at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] for a short buffer and
    /// [`ProtocolError::InvalidPayloadSize`] for a negative or oversized size.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < PACK_HEAD_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: PACK_HEAD_SIZE,
                available: bytes.len(),
            });
        }
        let msg_id = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let size = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if size < 0 || size as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::InvalidPayloadSize(size));
        }
        Ok(Self {
            msg_id,
            size: size as usize,
        })
    }
}

/// A framed packet: message id plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetPacket {
    msg_id: MessageId,
    payload: Vec<u8>,
}

impl NetPacket {
    pub fn new(msg_id: MessageId, payload: Vec<u8>) -> Self {
        Self { msg_id, payload }
    }

    pub fn msg_id(&self) -> MessageId {
        self.msg_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the head and payload into one buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPayloadSize`] when the payload exceeds
    /// [`MAX_PACKET_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::InvalidPayloadSize(
                i32::try_from(self.payload.len()).unwrap_or(i32::MAX),
            ));
        }
        let mut buf = Vec::with_capacity(PACK_HEAD_SIZE + self.payload.len());
        buf.extend_from_slice(&(self.msg_id as i32).to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as i32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Builds a packet from an already-read head and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownMessageType`] for unrecognized ids and
    /// [`ProtocolError::PayloadLengthMismatch`] if `payload` is not exactly
    /// `head.size` bytes.
    pub fn from_parts(head: PackHead, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() != head.size {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared: head.size,
                available: payload.len(),
            });
        }
        let msg_id =
            MessageId::try_from(head.msg_id).map_err(ProtocolError::UnknownMessageType)?;
        Ok(Self { msg_id, payload })
    }

    /// Decodes one packet from the beginning of `bytes`.
    ///
    /// Returns the packet and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the head is invalid or the buffer holds
    /// less than the declared payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let head = PackHead::decode(bytes)?;
        let total = PACK_HEAD_SIZE + head.size;
        if bytes.len() < total {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared: head.size,
                available: bytes.len() - PACK_HEAD_SIZE,
            });
        }
        let packet = Self::from_parts(head, bytes[PACK_HEAD_SIZE..total].to_vec())?;
        Ok((packet, total))
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Encodes a [`PeerMessage`] into a [`NetPacket`].
///
/// # Examples
///
/// ```rust
/// use coop_core::protocol::codec::{decode_peer_message, encode_peer_message};
/// use coop_core::protocol::messages::{DSoftbusStopCooperate, PeerMessage};
///
/// let msg = PeerMessage::StopCooperate(DSoftbusStopCooperate {
///     network_id: "local".into(),
///     normal: true,
/// });
/// let packet = encode_peer_message(&msg);
/// assert_eq!(decode_peer_message(&packet).unwrap(), msg);
/// ```
pub fn encode_peer_message(msg: &PeerMessage) -> NetPacket {
    let mut w = PacketWriter::new();
    match msg {
        PeerMessage::SessionBind(m) => encode_session_bind(&mut w, m),
        PeerMessage::StartCooperate(m) => encode_start_cooperate(&mut w, m),
        PeerMessage::StartCooperateResponse(m) => encode_start_response(&mut w, m),
        PeerMessage::StartCooperateFinished(m) => encode_start_finished(&mut w, m),
        PeerMessage::StopCooperate(m) => encode_stop_cooperate(&mut w, m),
        PeerMessage::ComeBack(m) => encode_come_back(&mut w, m),
        PeerMessage::RelayCooperate(m) => encode_relay(&mut w, &m.network_id, m.normal, &m.target_network_id),
        PeerMessage::RelayCooperateFinished(m) => {
            encode_relay(&mut w, &m.network_id, m.normal, &m.target_network_id)
        }
        PeerMessage::PointerEvent(m) => encode_pointer_event(&mut w, m),
        PeerMessage::KeyEvent(m) => encode_key_event(&mut w, m),
        PeerMessage::InputDevSync(m) => encode_dev_sync(&mut w, m),
        PeerMessage::InputDevHotPlug(m) => encode_dev_hot_plug(&mut w, m),
        PeerMessage::SubscribeMouseLocation(m) | PeerMessage::UnsubscribeMouseLocation(m) => {
            w.write_network_id(&m.network_id);
            w.write_network_id(&m.remote_network_id);
        }
        PeerMessage::ReplySubscribeMouseLocation(m) | PeerMessage::ReplyUnsubscribeMouseLocation(m) => {
            w.write_network_id(&m.network_id);
            w.write_network_id(&m.remote_network_id);
            w.write_bool(m.result);
        }
        PeerMessage::MouseLocation(m) => encode_mouse_location(&mut w, m),
    }
    NetPacket::new(msg.message_id(), w.into_inner())
}

/// Decodes the payload of a peer [`NetPacket`].
///
/// # Errors
///
/// Returns [`ProtocolError::NotPeerMessage`] for client notification ids and
/// [`ProtocolError::MalformedPayload`] / [`ProtocolError::InsufficientData`]
/// when the payload does not match the field layout of its id.
pub fn decode_peer_message(packet: &NetPacket) -> Result<PeerMessage, ProtocolError> {
    let mut r = PacketReader::new(packet.payload());
    let msg = match packet.msg_id() {
        MessageId::DsoftbusSessionBind => PeerMessage::SessionBind(DSoftbusSessionBind {
            network_id: r.read_network_id()?,
            session_name: r.read_string()?,
        }),
        MessageId::DsoftbusStartCooperate => PeerMessage::StartCooperate(decode_start_cooperate(&mut r)?),
        MessageId::DsoftbusStartCooperateResponse => {
            PeerMessage::StartCooperateResponse(DSoftbusStartCooperateResponse {
                network_id: r.read_network_id()?,
                normal: r.read_bool()?,
            })
        }
        MessageId::DsoftbusStartCooperateFinished => {
            PeerMessage::StartCooperateFinished(decode_start_finished(&mut r)?)
        }
        MessageId::DsoftbusStopCooperate => PeerMessage::StopCooperate(DSoftbusStopCooperate {
            network_id: r.read_network_id()?,
            normal: r.read_bool()?,
        }),
        MessageId::DsoftbusComeBack => PeerMessage::ComeBack(DSoftbusComeBack {
            network_id: r.read_network_id()?,
            origin_network_id: r.read_network_id()?,
            success: r.read_bool()?,
            cursor_pos: r.read_normalized()?,
        }),
        MessageId::DsoftbusRelayCooperate => PeerMessage::RelayCooperate(DSoftbusRelayCooperate {
            network_id: r.read_network_id()?,
            normal: r.read_bool()?,
            target_network_id: r.read_network_id()?,
        }),
        MessageId::DsoftbusRelayCooperateFinished => {
            PeerMessage::RelayCooperateFinished(DSoftbusRelayCooperateFinished {
                network_id: r.read_network_id()?,
                normal: r.read_bool()?,
                target_network_id: r.read_network_id()?,
            })
        }
        MessageId::DsoftbusInputPointerEvent => PeerMessage::PointerEvent(DSoftbusPointerEvent {
            network_id: r.read_network_id()?,
            device_id: r.read_i32()?,
            pointer_action: r.read_i32()?,
            source_type: r.read_i32()?,
            button: r.read_i32()?,
            position: r.read_coordinate()?,
            delta: r.read_coordinate()?,
        }),
        MessageId::DsoftbusInputKeyEvent => PeerMessage::KeyEvent(DSoftbusKeyEvent {
            network_id: r.read_network_id()?,
            device_id: r.read_i32()?,
            key_code: r.read_i32()?,
            key_action: r.read_i32()?,
        }),
        MessageId::DsoftbusInputDevSync => PeerMessage::InputDevSync(decode_dev_sync(&mut r)?),
        MessageId::DsoftbusInputDevHotPlug => PeerMessage::InputDevHotPlug(decode_dev_hot_plug(&mut r)?),
        MessageId::DsoftbusSubscribeMouseLocation => {
            PeerMessage::SubscribeMouseLocation(decode_subscribe(&mut r)?)
        }
        MessageId::DsoftbusUnsubscribeMouseLocation => {
            PeerMessage::UnsubscribeMouseLocation(decode_subscribe(&mut r)?)
        }
        MessageId::DsoftbusReplySubscribeMouseLocation => {
            PeerMessage::ReplySubscribeMouseLocation(decode_reply(&mut r)?)
        }
        MessageId::DsoftbusReplyUnsubscribeMouseLocation => {
            PeerMessage::ReplyUnsubscribeMouseLocation(decode_reply(&mut r)?)
        }
        MessageId::DsoftbusMouseLocation => PeerMessage::MouseLocation(DSoftbusSyncMouseLocation {
            network_id: r.read_network_id()?,
            remote_network_id: r.read_network_id()?,
            location: LocationInfo {
                display_x: r.read_i32()?,
                display_y: r.read_i32()?,
                display_width: r.read_i32()?,
                display_height: r.read_i32()?,
            },
        }),
        other @ (MessageId::Invalid
        | MessageId::CoordinationAddListener
        | MessageId::CoordinationMessage
        | MessageId::CoordinationGetState
        | MessageId::HotAreaAddListener
        | MessageId::MouseLocationAddListener) => return Err(ProtocolError::NotPeerMessage(other)),
    };
    Ok(msg)
}

// ── Per-message encode helpers ───────────────────────────────────────────────

fn encode_session_bind(w: &mut PacketWriter, m: &DSoftbusSessionBind) {
    w.write_network_id(&m.network_id);
    w.write_str(&m.session_name);
}

fn encode_start_cooperate(w: &mut PacketWriter, m: &DSoftbusStartCooperate) {
    w.write_network_id(&m.network_id);
    w.write_network_id(&m.origin_network_id);
    w.write_bool(m.success);
    w.write_normalized(m.cursor_pos);
    w.write_str(m.start_device_dhid.as_str());
    w.write_u32(m.flag);
}

fn encode_start_response(w: &mut PacketWriter, m: &DSoftbusStartCooperateResponse) {
    w.write_network_id(&m.network_id);
    w.write_bool(m.normal);
}

fn encode_start_finished(w: &mut PacketWriter, m: &DSoftbusStartCooperateFinished) {
    w.write_network_id(&m.network_id);
    w.write_network_id(&m.origin_network_id);
    w.write_bool(m.success);
    w.write_str(m.start_device_dhid.as_str());
    w.write_normalized(m.cursor_pos);
    w.write_u32(m.flag);
}

fn encode_stop_cooperate(w: &mut PacketWriter, m: &DSoftbusStopCooperate) {
    w.write_network_id(&m.network_id);
    w.write_bool(m.normal);
}

fn encode_come_back(w: &mut PacketWriter, m: &DSoftbusComeBack) {
    w.write_network_id(&m.network_id);
    w.write_network_id(&m.origin_network_id);
    w.write_bool(m.success);
    w.write_normalized(m.cursor_pos);
}

fn encode_relay(w: &mut PacketWriter, network_id: &NetworkId, normal: bool, target: &NetworkId) {
    w.write_network_id(network_id);
    w.write_bool(normal);
    w.write_network_id(target);
}

fn encode_pointer_event(w: &mut PacketWriter, m: &DSoftbusPointerEvent) {
    w.write_network_id(&m.network_id);
    w.write_i32(m.device_id);
    w.write_i32(m.pointer_action);
    w.write_i32(m.source_type);
    w.write_i32(m.button);
    w.write_coordinate(m.position);
    w.write_coordinate(m.delta);
}

fn encode_key_event(w: &mut PacketWriter, m: &DSoftbusKeyEvent) {
    w.write_network_id(&m.network_id);
    w.write_i32(m.device_id);
    w.write_i32(m.key_code);
    w.write_i32(m.key_action);
}

fn encode_dev_sync(w: &mut PacketWriter, m: &DSoftbusInputDevSync) {
    w.write_network_id(&m.network_id);
    w.write_i32(m.devices.len() as i32);
    for dev in &m.devices {
        w.write_device(dev);
    }
}

fn encode_dev_hot_plug(w: &mut PacketWriter, m: &DSoftbusInputDevHotPlug) {
    w.write_network_id(&m.network_id);
    w.write_i32(m.change.wire_type());
    match &m.change {
        HotPlugChange::Plug(dev) => w.write_device(dev),
        HotPlugChange::Unplug(device_id) => w.write_i32(*device_id),
    }
}

fn encode_mouse_location(w: &mut PacketWriter, m: &DSoftbusSyncMouseLocation) {
    w.write_network_id(&m.network_id);
    w.write_network_id(&m.remote_network_id);
    w.write_i32(m.location.display_x);
    w.write_i32(m.location.display_y);
    w.write_i32(m.location.display_width);
    w.write_i32(m.location.display_height);
}

// ── Per-message decode helpers ───────────────────────────────────────────────

fn decode_start_cooperate(r: &mut PacketReader<'_>) -> Result<DSoftbusStartCooperate, ProtocolError> {
    Ok(DSoftbusStartCooperate {
        network_id: r.read_network_id()?,
        origin_network_id: r.read_network_id()?,
        success: r.read_bool()?,
        cursor_pos: r.read_normalized()?,
        start_device_dhid: Dhid::new(r.read_string()?),
        flag: r.read_u32()?,
    })
}

fn decode_start_finished(
    r: &mut PacketReader<'_>,
) -> Result<DSoftbusStartCooperateFinished, ProtocolError> {
    Ok(DSoftbusStartCooperateFinished {
        network_id: r.read_network_id()?,
        origin_network_id: r.read_network_id()?,
        success: r.read_bool()?,
        start_device_dhid: Dhid::new(r.read_string()?),
        cursor_pos: r.read_normalized()?,
        flag: r.read_u32()?,
    })
}

fn decode_dev_sync(r: &mut PacketReader<'_>) -> Result<DSoftbusInputDevSync, ProtocolError> {
    let network_id = r.read_network_id()?;
    let count = r.read_i32()?;
    if !(0..=MAX_SYNC_DEVICES).contains(&count) {
        return Err(ProtocolError::MalformedPayload(format!(
            "device count {count} out of range"
        )));
    }
    let mut devices = Vec::with_capacity(count as usize);
    for _ in 0..count {
        devices.push(r.read_device()?);
    }
    Ok(DSoftbusInputDevSync { network_id, devices })
}

fn decode_dev_hot_plug(r: &mut PacketReader<'_>) -> Result<DSoftbusInputDevHotPlug, ProtocolError> {
    let network_id = r.read_network_id()?;
    let change = match r.read_i32()? {
        0 => HotPlugChange::Plug(r.read_device()?),
        1 => HotPlugChange::Unplug(r.read_i32()?),
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown hot-plug type: {other}"
            )))
        }
    };
    Ok(DSoftbusInputDevHotPlug { network_id, change })
}

fn decode_subscribe(r: &mut PacketReader<'_>) -> Result<DSoftbusSubscribeMouseLocation, ProtocolError> {
    Ok(DSoftbusSubscribeMouseLocation {
        network_id: r.read_network_id()?,
        remote_network_id: r.read_network_id()?,
    })
}

fn decode_reply(r: &mut PacketReader<'_>) -> Result<DSoftbusReplyMouseLocation, ProtocolError> {
    Ok(DSoftbusReplyMouseLocation {
        network_id: r.read_network_id()?,
        remote_network_id: r.read_network_id()?,
        result: r.read_bool()?,
    })
}

// ── Stream helpers ───────────────────────────────────────────────────────────

/// Append-only payload builder.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
    pub fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(u16::MAX as usize) as u16;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(&bytes[..len as usize]);
    }

    pub fn write_network_id(&mut self, id: &NetworkId) {
        self.write_str(id.as_str());
    }

    pub fn write_coordinate(&mut self, c: Coordinate) {
        self.write_i32(c.x);
        self.write_i32(c.y);
    }

    pub fn write_normalized(&mut self, c: NormalizedCoordinate) {
        self.write_i32(c.x);
        self.write_i32(c.y);
    }

    /// Writes every field of a device in its fixed wire order.
    pub fn write_device(&mut self, dev: &InputDevice) {
        self.write_i32(dev.id);
        self.write_str(&dev.dev_path);
        self.write_str(&dev.sys_path);
        self.write_i32(dev.bus);
        self.write_i32(dev.vendor);
        self.write_i32(dev.product);
        self.write_i32(dev.version);
        self.write_str(&dev.name);
        self.write_str(&dev.phys);
        self.write_str(&dev.uniq);
        self.write_bool(dev.is_pointer);
        self.write_bool(dev.is_keyboard);
        self.write_i32(dev.keyboard_type as i32);
    }
}

/// Sequential reader over a payload; every read checks the remaining length.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < self.offset + n {
            return Err(ProtocolError::InsufficientData {
                needed: self.offset + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::MalformedPayload(format!(
                "invalid bool byte 0x{other:02X} at offset {}",
                self.offset - 1
            ))),
        }
    }

    /// Reads a 2-byte length prefix and then that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len_bytes = self.take(2).map_err(|_| {
            ProtocolError::MalformedPayload(format!(
                "need 2 bytes for string length at offset {}",
                self.offset
            ))
        })?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let start = self.offset;
        let bytes = self.take(len).map_err(|_| {
            ProtocolError::MalformedPayload(format!(
                "string of length {len} at offset {start} exceeds buffer"
            ))
        })?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
    }

    pub fn read_network_id(&mut self) -> Result<NetworkId, ProtocolError> {
        self.read_string().map(NetworkId::new)
    }

    pub fn read_coordinate(&mut self) -> Result<Coordinate, ProtocolError> {
        Ok(Coordinate {
            x: self.read_i32()?,
            y: self.read_i32()?,
        })
    }

    pub fn read_normalized(&mut self) -> Result<NormalizedCoordinate, ProtocolError> {
        Ok(NormalizedCoordinate {
            x: self.read_i32()?,
            y: self.read_i32()?,
        })
    }

    pub fn read_device(&mut self) -> Result<InputDevice, ProtocolError> {
        Ok(InputDevice {
            id: self.read_i32()?,
            dev_path: self.read_string()?,
            sys_path: self.read_string()?,
            bus: self.read_i32()?,
            vendor: self.read_i32()?,
            product: self.read_i32()?,
            version: self.read_i32()?,
            name: self.read_string()?,
            phys: self.read_string()?,
            uniq: self.read_string()?,
            is_pointer: self.read_bool()?,
            is_keyboard: self.read_bool()?,
            keyboard_type: KeyboardType::from_i32(self.read_i32()?),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &PeerMessage) -> PeerMessage {
        let packet = encode_peer_message(msg);
        let bytes = packet.to_bytes().expect("encode failed");
        let (decoded_packet, consumed) = NetPacket::from_bytes(&bytes).expect("framing failed");
        assert_eq!(consumed, bytes.len(), "consumed bytes should equal total encoded size");
        decode_peer_message(&decoded_packet).expect("decode failed")
    }

    fn keyboard() -> InputDevice {
        InputDevice {
            id: 7,
            dev_path: "/dev/input/event3".to_string(),
            sys_path: "/sys/devices/kbd".to_string(),
            bus: 3,
            vendor: 0x04d9,
            product: 0x1702,
            version: 0x0110,
            name: "USB Keyboard".to_string(),
            phys: "usb-0000:00:14.0-3/input0".to_string(),
            uniq: "KB-01".to_string(),
            is_pointer: false,
            is_keyboard: true,
            keyboard_type: KeyboardType::AlphabeticKeyboard,
        }
    }

    // ── Framing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_pack_head_layout_is_id_then_size_big_endian() {
        // Arrange
        let packet = NetPacket::new(MessageId::DsoftbusStopCooperate, vec![0xAA, 0xBB]);

        // Act
        let bytes = packet.to_bytes().expect("encode");

        // Assert
        assert_eq!(&bytes[..4], &24i32.to_be_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_be_bytes());
        assert_eq!(&bytes[8..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_pack_head_rejects_negative_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&21i32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(PackHead::decode(&bytes), Err(ProtocolError::InvalidPayloadSize(-1)));
    }

    #[test]
    fn test_pack_head_rejects_oversized_payload() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&21i32.to_be_bytes());
        bytes.extend_from_slice(&((MAX_PACKET_SIZE as i32) + 1).to_be_bytes());
        assert!(matches!(
            PackHead::decode(&bytes),
            Err(ProtocolError::InvalidPayloadSize(_))
        ));
    }

    #[test]
    fn test_from_bytes_with_short_head_returns_insufficient_data() {
        assert_eq!(
            NetPacket::from_bytes(&[0, 0, 0]),
            Err(ProtocolError::InsufficientData { needed: 8, available: 3 })
        );
    }

    #[test]
    fn test_from_bytes_with_truncated_payload_returns_length_mismatch() {
        // Arrange
        let bytes = NetPacket::new(MessageId::DsoftbusStopCooperate, vec![1, 2, 3, 4])
            .to_bytes()
            .expect("encode");

        // Act
        let result = NetPacket::from_bytes(&bytes[..bytes.len() - 1]);

        // Assert
        assert_eq!(
            result,
            Err(ProtocolError::PayloadLengthMismatch { declared: 4, available: 3 })
        );
    }

    #[test]
    fn test_from_bytes_with_unknown_id_returns_unknown_message_type() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4242i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        assert_eq!(
            NetPacket::from_bytes(&bytes),
            Err(ProtocolError::UnknownMessageType(4242))
        );
    }

    #[test]
    fn test_client_notification_id_is_not_a_peer_message() {
        let packet = NetPacket::new(MessageId::CoordinationMessage, Vec::new());
        assert_eq!(
            decode_peer_message(&packet),
            Err(ProtocolError::NotPeerMessage(MessageId::CoordinationMessage))
        );
    }

    // ── Cooperation handshake ─────────────────────────────────────────────────

    #[test]
    fn test_start_cooperate_round_trip() {
        let msg = PeerMessage::StartCooperate(DSoftbusStartCooperate {
            network_id: "net-a".into(),
            origin_network_id: "net-a".into(),
            success: true,
            cursor_pos: NormalizedCoordinate::new(99, 37),
            start_device_dhid: Dhid::from("Input_abc"),
            flag: 0x1,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_start_finished_round_trip_preserves_negative_coordinates() {
        let msg = PeerMessage::StartCooperateFinished(DSoftbusStartCooperateFinished {
            network_id: "net-b".into(),
            origin_network_id: "net-a".into(),
            success: false,
            start_device_dhid: Dhid::from("Input_xyz"),
            cursor_pos: NormalizedCoordinate::new(-5, i32::MAX),
            flag: u32::MAX,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_relay_and_come_back_round_trip() {
        let relay = PeerMessage::RelayCooperateFinished(DSoftbusRelayCooperateFinished {
            network_id: "net-a".into(),
            normal: false,
            target_network_id: "net-c".into(),
        });
        let come_back = PeerMessage::ComeBack(DSoftbusComeBack {
            network_id: "net-b".into(),
            origin_network_id: "net-a".into(),
            success: true,
            cursor_pos: NormalizedCoordinate::new(0, 100),
        });
        assert_eq!(round_trip(&relay), relay);
        assert_eq!(round_trip(&come_back), come_back);
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    #[test]
    fn test_dev_sync_round_trip_keeps_every_device_field() {
        let mut mouse = keyboard();
        mouse.id = 8;
        mouse.is_pointer = true;
        mouse.is_keyboard = false;
        mouse.keyboard_type = KeyboardType::None;
        let msg = PeerMessage::InputDevSync(DSoftbusInputDevSync {
            network_id: "net-a".into(),
            devices: vec![keyboard(), mouse],
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_dev_hot_plug_round_trip_for_plug_and_unplug() {
        let plug = PeerMessage::InputDevHotPlug(DSoftbusInputDevHotPlug {
            network_id: "net-a".into(),
            change: HotPlugChange::Plug(keyboard()),
        });
        let unplug = PeerMessage::InputDevHotPlug(DSoftbusInputDevHotPlug {
            network_id: "net-a".into(),
            change: HotPlugChange::Unplug(7),
        });
        assert_eq!(round_trip(&plug), plug);
        assert_eq!(round_trip(&unplug), unplug);
    }

    #[test]
    fn test_dev_sync_with_excessive_count_is_malformed() {
        // Arrange
        let mut w = PacketWriter::new();
        w.write_str("net-a");
        w.write_i32(MAX_SYNC_DEVICES + 1);
        let packet = NetPacket::new(MessageId::DsoftbusInputDevSync, w.into_inner());

        // Act
        let result = decode_peer_message(&packet);

        // Assert
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_truncated_start_payload_is_rejected() {
        // Arrange
        let full = encode_peer_message(&PeerMessage::StartCooperate(DSoftbusStartCooperate {
            network_id: "net-a".into(),
            ..Default::default()
        }));
        let short = NetPacket::new(full.msg_id(), full.payload()[..full.payload().len() - 2].to_vec());

        // Act / Assert
        assert!(decode_peer_message(&short).is_err());
    }

    #[test]
    fn test_invalid_bool_byte_is_rejected() {
        let mut w = PacketWriter::new();
        w.write_str("net-a");
        let mut payload = w.into_inner();
        payload.push(7);
        let packet = NetPacket::new(MessageId::DsoftbusStopCooperate, payload);
        assert!(matches!(
            decode_peer_message(&packet),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    // ── Mouse location ────────────────────────────────────────────────────────

    #[test]
    fn test_mouse_location_round_trip() {
        let msg = PeerMessage::MouseLocation(DSoftbusSyncMouseLocation {
            network_id: "net-b".into(),
            remote_network_id: NetworkId::empty(),
            location: LocationInfo {
                display_x: 640,
                display_y: 360,
                display_width: 1280,
                display_height: 720,
            },
        });
        assert_eq!(round_trip(&msg), msg);
    }
}
