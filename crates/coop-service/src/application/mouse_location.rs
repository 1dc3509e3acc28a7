//! Mouse-location sharing between local clients and peers.
//!
//! A client registers interest in the pointer location of some device:
//!
//! - the **local** device: every local pointer event is reported directly;
//! - a **peer**: this service subscribes on the peer's behalf
//!   (`DSOFTBUS_SUBSCRIBE_MOUSE_LOCATION`), the peer acknowledges and then
//!   streams `DSOFTBUS_MOUSE_LOCATION` packets, which are fanned out to the
//!   local clients watching that peer.
//!
//! Conversely, peers subscribed to *this* device are kept in
//! `remote_subscribers` and receive a packet per local pointer event.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use coop_core::protocol::messages::{
    DSoftbusReplyMouseLocation, DSoftbusSubscribeMouseLocation, DSoftbusSyncMouseLocation,
    LocationInfo, PeerMessage,
};
use coop_core::{Coordinate, DisplayInfo, NetworkId};
use tracing::{info, warn};

use crate::application::collaborators::ClientNotifier;
use crate::application::dsoftbus_handler::DSoftbusHandler;

pub struct MouseLocation {
    notifier: Arc<dyn ClientNotifier>,
    local: NetworkId,
    /// Watched device -> client pids.
    listeners: BTreeMap<NetworkId, BTreeSet<i32>>,
    /// Peers subscribed to this device's location.
    remote_subscribers: BTreeSet<NetworkId>,
}

impl MouseLocation {
    pub fn new(notifier: Arc<dyn ClientNotifier>, local: NetworkId) -> Self {
        Self {
            notifier,
            local,
            listeners: BTreeMap::new(),
            remote_subscribers: BTreeSet::new(),
        }
    }

    /// Registers `pid` for the location of `network_id`.
    pub fn add_listener(&mut self, pid: i32, network_id: &NetworkId, dsoftbus: &DSoftbusHandler) {
        let pids = self.listeners.entry(network_id.clone()).or_default();
        let first = pids.is_empty();
        pids.insert(pid);
        if first && *network_id != self.local {
            self.send_subscription(network_id, true, dsoftbus);
        }
    }

    pub fn remove_listener(&mut self, pid: i32, network_id: &NetworkId, dsoftbus: &DSoftbusHandler) {
        let Some(pids) = self.listeners.get_mut(network_id) else {
            return;
        };
        pids.remove(&pid);
        if pids.is_empty() {
            self.listeners.remove(network_id);
            if *network_id != self.local {
                self.send_subscription(network_id, false, dsoftbus);
            }
        }
    }

    pub fn on_client_died(&mut self, pid: i32, dsoftbus: &DSoftbusHandler) {
        let watched: Vec<NetworkId> = self
            .listeners
            .iter()
            .filter(|(_, pids)| pids.contains(&pid))
            .map(|(id, _)| id.clone())
            .collect();
        for network_id in watched {
            self.remove_listener(pid, &network_id, dsoftbus);
        }
    }

    fn send_subscription(&self, peer: &NetworkId, subscribe: bool, dsoftbus: &DSoftbusHandler) {
        let body = DSoftbusSubscribeMouseLocation {
            network_id: self.local.clone(),
            remote_network_id: peer.clone(),
        };
        let msg = if subscribe {
            PeerMessage::SubscribeMouseLocation(body)
        } else {
            PeerMessage::UnsubscribeMouseLocation(body)
        };
        let result = dsoftbus
            .open_session(peer)
            .and_then(|()| dsoftbus.send(peer, &msg));
        if let Err(e) = result {
            warn!("mouse-location subscription to {} failed: {e}", peer.anonymized());
        }
    }

    /// Reports a local pointer position to local listeners and subscribed peers.
    pub fn process_pointer(&self, display: DisplayInfo, pos: Coordinate, dsoftbus: &DSoftbusHandler) {
        let location = LocationInfo {
            display_x: pos.x,
            display_y: pos.y,
            display_width: display.width,
            display_height: display.height,
        };
        if let Some(pids) = self.listeners.get(&self.local) {
            for &pid in pids {
                self.notifier.notify_mouse_location(pid, &self.local, location);
            }
        }
        for peer in &self.remote_subscribers {
            let msg = PeerMessage::MouseLocation(DSoftbusSyncMouseLocation {
                network_id: self.local.clone(),
                remote_network_id: peer.clone(),
                location,
            });
            if let Err(e) = dsoftbus.send(peer, &msg) {
                warn!("mouse location to {} failed: {e}", peer.anonymized());
            }
        }
    }

    /// A peer subscribes to this device's location.
    pub fn on_subscribe(&mut self, event: &DSoftbusSubscribeMouseLocation, dsoftbus: &DSoftbusHandler) {
        info!("{} subscribed to mouse location", event.network_id.anonymized());
        self.remote_subscribers.insert(event.network_id.clone());
        self.reply(event, true, true, dsoftbus);
    }

    pub fn on_unsubscribe(&mut self, event: &DSoftbusSubscribeMouseLocation, dsoftbus: &DSoftbusHandler) {
        let removed = self.remote_subscribers.remove(&event.network_id);
        self.reply(event, false, removed, dsoftbus);
    }

    fn reply(
        &self,
        event: &DSoftbusSubscribeMouseLocation,
        subscribe: bool,
        result: bool,
        dsoftbus: &DSoftbusHandler,
    ) {
        let body = DSoftbusReplyMouseLocation {
            network_id: self.local.clone(),
            remote_network_id: event.network_id.clone(),
            result,
        };
        let msg = if subscribe {
            PeerMessage::ReplySubscribeMouseLocation(body)
        } else {
            PeerMessage::ReplyUnsubscribeMouseLocation(body)
        };
        if let Err(e) = dsoftbus.send(&event.network_id, &msg) {
            warn!("mouse-location reply to {} failed: {e}", event.network_id.anonymized());
        }
    }

    pub fn on_reply(&self, event: &DSoftbusReplyMouseLocation, subscribe: bool) {
        if !event.result {
            warn!(
                "{} refused mouse-location {}",
                event.network_id.anonymized(),
                if subscribe { "subscribe" } else { "unsubscribe" }
            );
        }
    }

    /// Fans a peer's location out to the local clients watching it.
    pub fn on_remote_location(&self, event: &DSoftbusSyncMouseLocation) {
        if let Some(pids) = self.listeners.get(&event.network_id) {
            for &pid in pids {
                self.notifier
                    .notify_mouse_location(pid, &event.network_id, event.location);
            }
        }
    }

    /// Drops the subscription of a peer whose session closed.
    pub fn on_session_closed(&mut self, network_id: &NetworkId) {
        self.remote_subscribers.remove(network_id);
    }

    pub fn is_subscribed_by(&self, network_id: &NetworkId) -> bool {
        self.remote_subscribers.contains(network_id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(BTreeSet::len).sum()
    }
}
