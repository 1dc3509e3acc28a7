//! Bridge between the session transport and the cooperate event channel.
//!
//! Outbound, [`DSoftbusHandler`] encodes [`PeerMessage`]s and hands them to
//! the [`SessionTransport`].  Inbound, its [`SessionObserver`] runs on the
//! transport's threads, decodes each packet and posts the matching
//! [`CooperateEvent`]; it never touches cooperate state itself.
//!
//! Pointer and key packets are left unconsumed so the input-injection
//! observer registered while `IN` can take them without a worker round-trip.

use std::sync::{Arc, Weak};

use coop_core::protocol::codec::{decode_peer_message, encode_peer_message};
use coop_core::protocol::messages::PeerMessage;
use coop_core::{NetPacket, NetworkId};
use tracing::{debug, warn};

use crate::application::channel::EventSender;
use crate::application::collaborators::{SessionObserver, SessionTransport};
use crate::application::error::TransportError;
use crate::application::event::CooperateEvent;

pub struct DSoftbusHandler {
    transport: Arc<dyn SessionTransport>,
    observer: Arc<dyn SessionObserver>,
    enabled: bool,
}

impl DSoftbusHandler {
    pub fn new(transport: Arc<dyn SessionTransport>, sender: EventSender) -> Self {
        Self {
            transport,
            observer: Arc::new(PacketTranslator { sender }),
            enabled: false,
        }
    }

    pub fn enable(&mut self) -> Result<(), TransportError> {
        if self.enabled {
            return Ok(());
        }
        self.transport.enable()?;
        self.transport.add_observer(Arc::downgrade(&self.observer));
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.transport.remove_observer(&Arc::downgrade(&self.observer));
        self.transport.disable();
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn local_network_id(&self) -> NetworkId {
        self.transport.local_network_id()
    }

    pub fn open_session(&self, network_id: &NetworkId) -> Result<(), TransportError> {
        self.transport.open_session(network_id)
    }

    pub fn close_session(&self, network_id: &NetworkId) {
        self.transport.close_session(network_id);
    }

    pub fn has_session(&self, network_id: &NetworkId) -> bool {
        self.transport.has_session(network_id)
    }

    /// Encodes and sends one message to `peer`.
    pub fn send(&self, peer: &NetworkId, msg: &PeerMessage) -> Result<(), TransportError> {
        let packet = encode_peer_message(msg);
        debug!("send {:?} to {}", packet.msg_id(), peer.anonymized());
        self.transport.send_packet(peer, &packet)
    }

    pub fn add_observer(&self, observer: Weak<dyn SessionObserver>) {
        self.transport.add_observer(observer);
    }

    pub fn remove_observer(&self, observer: &Weak<dyn SessionObserver>) {
        self.transport.remove_observer(observer);
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }
}

/// Session observer that turns packets into events.
struct PacketTranslator {
    sender: EventSender,
}

impl SessionObserver for PacketTranslator {
    fn on_bind(&self, network_id: &NetworkId) {
        self.sender.send(CooperateEvent::DSoftbusSessionOpened {
            network_id: network_id.clone(),
        });
    }

    fn on_shutdown(&self, network_id: &NetworkId) {
        self.sender.send(CooperateEvent::DSoftbusSessionClosed {
            network_id: network_id.clone(),
        });
    }

    fn on_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> bool {
        let msg = match decode_peer_message(packet) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("malformed {:?} from {}: {e}", packet.msg_id(), network_id.anonymized());
                return true;
            }
        };
        if msg.sender() != network_id {
            warn!(
                "{:?} claims sender {} on session with {}, dropped",
                packet.msg_id(),
                msg.sender().anonymized(),
                network_id.anonymized()
            );
            return true;
        }
        let event = match msg {
            PeerMessage::PointerEvent(_) | PeerMessage::KeyEvent(_) => return false,
            PeerMessage::SessionBind(_) => return true,
            PeerMessage::StartCooperate(m) => CooperateEvent::DSoftbusStartCooperate(m),
            PeerMessage::StartCooperateResponse(m) => CooperateEvent::DSoftbusStartCooperateResponse(m),
            PeerMessage::StartCooperateFinished(m) => CooperateEvent::DSoftbusStartCooperateFinished(m),
            PeerMessage::StopCooperate(m) => CooperateEvent::DSoftbusStopCooperate(m),
            PeerMessage::ComeBack(m) => CooperateEvent::DSoftbusComeBack(m),
            PeerMessage::RelayCooperate(m) => CooperateEvent::DSoftbusRelayCooperate(m),
            PeerMessage::RelayCooperateFinished(m) => CooperateEvent::DSoftbusRelayCooperateFinished(m),
            PeerMessage::InputDevSync(m) => CooperateEvent::DSoftbusInputDevSync(m),
            PeerMessage::InputDevHotPlug(m) => CooperateEvent::DSoftbusInputDevHotPlug(m),
            PeerMessage::SubscribeMouseLocation(m) => CooperateEvent::DSoftbusSubscribeMouseLocation(m),
            PeerMessage::UnsubscribeMouseLocation(m) => {
                CooperateEvent::DSoftbusUnsubscribeMouseLocation(m)
            }
            PeerMessage::ReplySubscribeMouseLocation(m) => {
                CooperateEvent::DSoftbusReplySubscribeMouseLocation(m)
            }
            PeerMessage::ReplyUnsubscribeMouseLocation(m) => {
                CooperateEvent::DSoftbusReplyUnsubscribeMouseLocation(m)
            }
            PeerMessage::MouseLocation(m) => CooperateEvent::DSoftbusMouseLocation(m),
        };
        self.sender.send(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use coop_core::protocol::messages::{DSoftbusKeyEvent, DSoftbusStopCooperate};
    use coop_core::MessageId;

    use super::*;
    use crate::application::channel::channel;

    fn stop_from(sender: &str) -> NetPacket {
        encode_peer_message(&PeerMessage::StopCooperate(DSoftbusStopCooperate {
            network_id: NetworkId::from(sender),
            normal: true,
        }))
    }

    #[test]
    fn test_translator_posts_event_for_matching_sender() {
        // Arrange
        let (tx, mut rx) = channel();
        let translator = PacketTranslator { sender: tx };

        // Act
        let consumed = translator.on_packet(&NetworkId::from("peer-b"), &stop_from("peer-b"));

        // Assert
        assert!(consumed);
        match rx.try_recv() {
            Some(CooperateEvent::DSoftbusStopCooperate(m)) => {
                assert_eq!(m.network_id, NetworkId::from("peer-b"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_translator_drops_packet_with_spoofed_sender() {
        let (tx, mut rx) = channel();
        let translator = PacketTranslator { sender: tx };
        assert!(translator.on_packet(&NetworkId::from("peer-b"), &stop_from("peer-c")));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_translator_drops_malformed_packet() {
        let (tx, mut rx) = channel();
        let translator = PacketTranslator { sender: tx };
        let packet = NetPacket::new(MessageId::DsoftbusStopCooperate, vec![0xFF]);
        assert!(translator.on_packet(&NetworkId::from("peer-b"), &packet));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_translator_leaves_input_packets_unconsumed() {
        // Arrange
        let (tx, mut rx) = channel();
        let translator = PacketTranslator { sender: tx };
        let packet = encode_peer_message(&PeerMessage::KeyEvent(DSoftbusKeyEvent {
            network_id: NetworkId::from("peer-b"),
            ..Default::default()
        }));

        // Act
        let consumed = translator.on_packet(&NetworkId::from("peer-b"), &packet);

        // Assert
        assert!(!consumed);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_session_callbacks_post_lifecycle_events() {
        let (tx, mut rx) = channel();
        let translator = PacketTranslator { sender: tx };
        translator.on_bind(&NetworkId::from("peer-b"));
        translator.on_shutdown(&NetworkId::from("peer-b"));
        assert!(matches!(rx.try_recv(), Some(CooperateEvent::DSoftbusSessionOpened { .. })));
        assert!(matches!(rx.try_recv(), Some(CooperateEvent::DSoftbusSessionClosed { .. })));
    }
}
