//! Moving input events between the two ends of a cooperation.
//!
//! - [`InputForwarder`] runs on the device in `OUT`: it intercepts local
//!   pointer and key events and sends them straight to the peer over the
//!   session transport, without a round-trip through the worker.
//! - [`InputEventBuilder`] runs on the device in `IN`: it is a session
//!   observer that injects the peer's pointer and key packets into the local
//!   input pipeline.  Packets from any other device are dropped.

use std::sync::{Arc, Mutex, PoisonError};

use coop_core::protocol::codec::{decode_peer_message, encode_peer_message};
use coop_core::protocol::messages::{DSoftbusKeyEvent, DSoftbusPointerEvent, PeerMessage};
use coop_core::{MessageId, NetPacket, NetworkId};
use tracing::{debug, warn};

use crate::application::collaborators::{
    InputAdapter, InterceptedInput, SessionObserver, SessionTransport,
};
use crate::application::error::InputError;

// ── OUT side ─────────────────────────────────────────────────────────────────

pub struct InputForwarder {
    input: Arc<dyn InputAdapter>,
    interceptor_id: Option<i32>,
}

impl InputForwarder {
    pub fn new(input: Arc<dyn InputAdapter>) -> Self {
        Self {
            input,
            interceptor_id: None,
        }
    }

    /// Starts forwarding to `peer`.  Pointer events are forwarded only when
    /// they come from `start_device_id`; key events always are.
    pub fn start(
        &mut self,
        transport: Arc<dyn SessionTransport>,
        local: NetworkId,
        peer: NetworkId,
        start_device_id: i32,
    ) -> Result<(), InputError> {
        self.stop();
        let callback = Arc::new(move |input: InterceptedInput| {
            let msg = match input {
                InterceptedInput::Pointer(ev) if ev.device_id == start_device_id => {
                    PeerMessage::PointerEvent(DSoftbusPointerEvent {
                        network_id: local.clone(),
                        device_id: ev.device_id,
                        pointer_action: ev.pointer_action,
                        source_type: ev.source_type,
                        button: ev.button,
                        position: ev.position,
                        delta: ev.delta,
                    })
                }
                InterceptedInput::Pointer(_) => return,
                InterceptedInput::Key(ev) => PeerMessage::KeyEvent(DSoftbusKeyEvent {
                    network_id: local.clone(),
                    device_id: ev.device_id,
                    key_code: ev.key_code,
                    key_action: ev.key_action,
                }),
            };
            if let Err(e) = transport.send_packet(&peer, &encode_peer_message(&msg)) {
                warn!("forwarding input to {} failed: {e}", peer.anonymized());
            }
        });
        self.interceptor_id = Some(self.input.add_interceptor(callback)?);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.interceptor_id.take() {
            self.input.remove_interceptor(id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.interceptor_id.is_some()
    }
}

// ── IN side ──────────────────────────────────────────────────────────────────

pub struct InputEventBuilder {
    input: Arc<dyn InputAdapter>,
    /// Device whose input is accepted; empty while idle.
    peer: Mutex<NetworkId>,
}

impl InputEventBuilder {
    pub fn new(input: Arc<dyn InputAdapter>) -> Self {
        Self {
            input,
            peer: Mutex::new(NetworkId::empty()),
        }
    }

    pub fn enable(&self, peer: &NetworkId) {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = peer.clone();
    }

    pub fn disable(&self) {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = NetworkId::empty();
    }

    fn accepts(&self, network_id: &NetworkId) -> bool {
        let peer = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        !peer.is_empty() && *peer == *network_id
    }
}

impl SessionObserver for InputEventBuilder {
    fn on_bind(&self, _network_id: &NetworkId) {}

    fn on_shutdown(&self, _network_id: &NetworkId) {}

    fn on_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> bool {
        if !matches!(
            packet.msg_id(),
            MessageId::DsoftbusInputPointerEvent | MessageId::DsoftbusInputKeyEvent
        ) {
            return false;
        }
        if !self.accepts(network_id) {
            debug!("input from {} ignored", network_id.anonymized());
            return true;
        }
        let result = match decode_peer_message(packet) {
            Ok(PeerMessage::PointerEvent(ev)) => self.input.simulate_pointer_event(&ev),
            Ok(PeerMessage::KeyEvent(ev)) => self.input.simulate_key_event(&ev),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("malformed input packet from {}: {e}", network_id.anonymized());
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("input injection failed: {e}");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event::{InputKeyEvent, InputPointerEvent, SOURCE_TYPE_MOUSE};
    use crate::infrastructure::mock::{RecordingInput, RecordingTransport};

    fn pointer_packet(from: &str) -> NetPacket {
        encode_peer_message(&PeerMessage::PointerEvent(DSoftbusPointerEvent {
            network_id: NetworkId::from(from),
            device_id: 3,
            ..Default::default()
        }))
    }

    #[test]
    fn test_builder_injects_only_peer_input() {
        // Arrange
        let input = Arc::new(RecordingInput::default());
        let builder = InputEventBuilder::new(input.clone());
        builder.enable(&NetworkId::from("peer-a"));

        // Act
        let from_peer = builder.on_packet(&NetworkId::from("peer-a"), &pointer_packet("peer-a"));
        let from_stranger = builder.on_packet(&NetworkId::from("peer-c"), &pointer_packet("peer-c"));

        // Assert
        assert!(from_peer);
        assert!(from_stranger);
        assert_eq!(input.simulated_pointers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_builder_leaves_other_packets_alone() {
        let input = Arc::new(RecordingInput::default());
        let builder = InputEventBuilder::new(input);
        builder.enable(&NetworkId::from("peer-a"));
        let packet = NetPacket::new(MessageId::DsoftbusStopCooperate, Vec::new());
        assert!(!builder.on_packet(&NetworkId::from("peer-a"), &packet));
    }

    #[test]
    fn test_disabled_builder_drops_input() {
        let input = Arc::new(RecordingInput::default());
        let builder = InputEventBuilder::new(input.clone());
        builder.enable(&NetworkId::from("peer-a"));
        builder.disable();
        builder.on_packet(&NetworkId::from("peer-a"), &pointer_packet("peer-a"));
        assert!(input.simulated_pointers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_forwarder_sends_start_device_pointer_and_keys() {
        // Arrange
        let input = Arc::new(RecordingInput::default());
        let transport = Arc::new(RecordingTransport::new("local"));
        let mut forwarder = InputForwarder::new(input.clone());
        forwarder
            .start(transport.clone(), NetworkId::from("local"), NetworkId::from("peer-b"), 1)
            .expect("start");

        // Act
        input.intercept(InterceptedInput::Pointer(InputPointerEvent {
            device_id: 1,
            source_type: SOURCE_TYPE_MOUSE,
            ..Default::default()
        }));
        input.intercept(InterceptedInput::Pointer(InputPointerEvent {
            device_id: 2,
            ..Default::default()
        }));
        input.intercept(InterceptedInput::Key(InputKeyEvent {
            device_id: 9,
            key_code: 2017,
            key_action: 1,
        }));

        // Assert
        let sent = transport.sent_to(&NetworkId::from("peer-b"));
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], PeerMessage::PointerEvent(ref ev) if ev.device_id == 1));
        assert!(matches!(sent[1], PeerMessage::KeyEvent(ref ev) if ev.key_code == 2017));
    }

    #[test]
    fn test_forwarder_stop_removes_interceptor() {
        let input = Arc::new(RecordingInput::default());
        let transport = Arc::new(RecordingTransport::new("local"));
        let mut forwarder = InputForwarder::new(input.clone());
        forwarder
            .start(transport, NetworkId::from("local"), NetworkId::from("peer-b"), 1)
            .expect("start");
        forwarder.stop();
        assert!(!forwarder.is_active());
        assert!(!input.has_interceptor());
    }
}
