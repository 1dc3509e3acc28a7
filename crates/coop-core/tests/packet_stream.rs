//! Integration tests for the coop-core packet codec.
//!
//! These tests exercise framing and payload decoding together through the
//! public API, the way a session reader consumes a byte stream that may hold
//! several packets back to back.

use coop_core::protocol::codec::{
    decode_peer_message, encode_peer_message, NetPacket, PackHead, PACK_HEAD_SIZE,
};
use coop_core::protocol::messages::{
    DSoftbusKeyEvent, DSoftbusPointerEvent, DSoftbusSessionBind, DSoftbusStartCooperateResponse,
    PeerMessage,
};
use coop_core::{Coordinate, NetworkId};

fn frame(msg: &PeerMessage) -> Vec<u8> {
    encode_peer_message(msg)
        .to_bytes()
        .expect("encode must succeed")
}

#[test]
fn test_back_to_back_packets_decode_in_order() {
    // Arrange
    let first = PeerMessage::SessionBind(DSoftbusSessionBind {
        network_id: NetworkId::from("device-a-network-id"),
        session_name: "ohos.msdp.device_status.device-a-network-id".to_string(),
    });
    let second = PeerMessage::PointerEvent(DSoftbusPointerEvent {
        network_id: NetworkId::from("device-a-network-id"),
        device_id: 3,
        pointer_action: 2,
        source_type: 1,
        button: -1,
        position: Coordinate::new(1919, 0),
        delta: Coordinate::new(12, -4),
    });
    let third = PeerMessage::KeyEvent(DSoftbusKeyEvent {
        network_id: NetworkId::from("device-a-network-id"),
        device_id: 4,
        key_code: 2017,
        key_action: 2,
    });
    let mut stream = frame(&first);
    stream.extend(frame(&second));
    stream.extend(frame(&third));

    // Act
    let mut decoded = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let (packet, consumed) = NetPacket::from_bytes(&stream[offset..]).expect("framing");
        decoded.push(decode_peer_message(&packet).expect("payload"));
        offset += consumed;
    }

    // Assert
    assert_eq!(decoded, vec![first, second, third]);
}

#[test]
fn test_head_alone_announces_payload_size() {
    // Arrange
    let msg = PeerMessage::StartCooperateResponse(DSoftbusStartCooperateResponse {
        network_id: NetworkId::from("peer"),
        normal: true,
    });
    let bytes = frame(&msg);

    // Act
    let head = PackHead::decode(&bytes[..PACK_HEAD_SIZE]).expect("head");

    // Assert
    assert_eq!(head.size, bytes.len() - PACK_HEAD_SIZE);
    // "peer" => 2-byte length + 4 bytes, then 1 bool byte.
    assert_eq!(head.size, 7);
}

#[test]
fn test_partial_stream_is_reported_not_panicking() {
    let bytes = frame(&PeerMessage::KeyEvent(DSoftbusKeyEvent {
        network_id: NetworkId::from("peer"),
        ..Default::default()
    }));
    for cut in 0..bytes.len() {
        assert!(NetPacket::from_bytes(&bytes[..cut]).is_err(), "cut at {cut}");
    }
}
