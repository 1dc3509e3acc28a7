//! Devices reported by peers over `DSOFTBUS_INPUT_DEV_SYNC` and
//! `DSOFTBUS_INPUT_DEV_HOT_PLUG`.
//!
//! The registry is bounded: at most [`MAX_DEVICES_PER_PEER`] devices per peer
//! and [`MAX_TOTAL_DEVICES`] overall.  Anything beyond the caps is dropped
//! with a warning.

use std::collections::BTreeMap;

use coop_core::protocol::messages::HotPlugChange;
use coop_core::{InputDevice, NetworkId};
use tracing::warn;

pub const MAX_DEVICES_PER_PEER: usize = 10;
pub const MAX_TOTAL_DEVICES: usize = 100;

#[derive(Debug, Default)]
pub struct RemoteDeviceRegistry {
    peers: BTreeMap<NetworkId, BTreeMap<i32, InputDevice>>,
}

impl RemoteDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the device list of `network_id`.
    pub fn sync(&mut self, network_id: &NetworkId, devices: Vec<InputDevice>) {
        self.peers.remove(network_id);
        let budget = MAX_TOTAL_DEVICES
            .saturating_sub(self.total())
            .min(MAX_DEVICES_PER_PEER);
        if devices.len() > budget {
            warn!(
                "{} reported {} devices, keeping {budget}",
                network_id.anonymized(),
                devices.len()
            );
        }
        let kept: BTreeMap<i32, InputDevice> = devices
            .into_iter()
            .take(budget)
            .map(|dev| (dev.id, dev))
            .collect();
        self.peers.insert(network_id.clone(), kept);
    }

    /// Applies one device change.  Returns `false` when it was rejected.
    pub fn apply(&mut self, network_id: &NetworkId, change: &HotPlugChange) -> bool {
        match change {
            HotPlugChange::Plug(dev) => {
                let total = self.total();
                let devices = self.peers.entry(network_id.clone()).or_default();
                let replacing = devices.contains_key(&dev.id);
                if !replacing && (devices.len() >= MAX_DEVICES_PER_PEER || total >= MAX_TOTAL_DEVICES) {
                    warn!("remote device limit reached, dropping plug from {}", network_id.anonymized());
                    return false;
                }
                devices.insert(dev.id, dev.clone());
                true
            }
            HotPlugChange::Unplug(device_id) => self
                .peers
                .get_mut(network_id)
                .and_then(|devices| devices.remove(device_id))
                .is_some(),
        }
    }

    pub fn remove_peer(&mut self, network_id: &NetworkId) {
        self.peers.remove(network_id);
    }

    pub fn devices_of(&self, network_id: &NetworkId) -> Vec<InputDevice> {
        self.peers
            .get(network_id)
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.peers.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(count: i32) -> Vec<InputDevice> {
        (0..count)
            .map(|id| InputDevice {
                id,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_sync_caps_devices_per_peer() {
        // Arrange
        let mut registry = RemoteDeviceRegistry::new();
        let peer = NetworkId::from("peer-b");

        // Act
        registry.sync(&peer, devices(15));

        // Assert
        assert_eq!(registry.devices_of(&peer).len(), MAX_DEVICES_PER_PEER);
    }

    #[test]
    fn test_sync_replaces_previous_list() {
        let mut registry = RemoteDeviceRegistry::new();
        let peer = NetworkId::from("peer-b");
        registry.sync(&peer, devices(5));
        registry.sync(&peer, devices(2));
        assert_eq!(registry.total(), 2);
    }

    #[test]
    fn test_total_cap_across_peers() {
        // Arrange
        let mut registry = RemoteDeviceRegistry::new();
        for n in 0..10 {
            registry.sync(&NetworkId::new(format!("peer-{n}")), devices(10));
        }

        // Act
        registry.sync(&NetworkId::from("peer-late"), devices(3));
        let accepted = registry.apply(
            &NetworkId::from("peer-late"),
            &HotPlugChange::Plug(InputDevice {
                id: 50,
                ..Default::default()
            }),
        );

        // Assert
        assert_eq!(registry.total(), MAX_TOTAL_DEVICES);
        assert!(registry.devices_of(&NetworkId::from("peer-late")).is_empty());
        assert!(!accepted);
    }

    #[test]
    fn test_hot_plug_and_unplug() {
        // Arrange
        let mut registry = RemoteDeviceRegistry::new();
        let peer = NetworkId::from("peer-b");
        let dev = InputDevice {
            id: 3,
            ..Default::default()
        };

        // Act / Assert
        assert!(registry.apply(&peer, &HotPlugChange::Plug(dev)));
        assert_eq!(registry.devices_of(&peer).len(), 1);
        assert!(registry.apply(&peer, &HotPlugChange::Unplug(3)));
        assert!(!registry.apply(&peer, &HotPlugChange::Unplug(3)));
        assert!(registry.devices_of(&peer).is_empty());
    }

    #[test]
    fn test_remove_peer_drops_its_devices() {
        let mut registry = RemoteDeviceRegistry::new();
        registry.sync(&NetworkId::from("peer-b"), devices(3));
        registry.sync(&NetworkId::from("peer-c"), devices(2));
        registry.remove_peer(&NetworkId::from("peer-b"));
        assert_eq!(registry.total(), 2);
    }
}
