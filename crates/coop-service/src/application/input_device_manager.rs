//! Registry of locally attached input devices.
//!
//! Keeps `{device id -> InputDevice}` for everything the [`DeviceSource`]
//! reports (physical devices and virtual devices mirroring a peer) and turns
//! changes that matter to cooperation into `InputHotplug` events:
//!
//! - a local alphabetic keyboard was plugged (`PlugKeyboard`);
//! - a pointer was unplugged (`UnplugPointer`);
//! - an alphabetic keyboard was unplugged (`UnplugKeyboard`).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use coop_core::{Dhid, InputDevice, NetworkId};
use tracing::{debug, info};

use crate::application::channel::EventSender;
use crate::application::collaborators::DeviceSource;
use crate::application::error::InputError;
use crate::application::event::{CooperateEvent, HotplugKind, InputHotplugEvent};

pub struct InputDeviceManager {
    source: Arc<dyn DeviceSource>,
    sender: EventSender,
    devices: BTreeMap<i32, InputDevice>,
    enabled: bool,
}

impl InputDeviceManager {
    pub fn new(source: Arc<dyn DeviceSource>, sender: EventSender) -> Self {
        Self {
            source,
            sender,
            devices: BTreeMap::new(),
            enabled: false,
        }
    }

    pub fn enable(&mut self) -> Result<(), InputError> {
        if self.enabled {
            return Ok(());
        }
        let attached = self.source.enable(self.sender.clone())?;
        info!("device manager enabled with {} device(s)", attached.len());
        self.devices = attached.into_iter().map(|dev| (dev.id, dev)).collect();
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.source.disable();
        self.devices.clear();
        self.enabled = false;
    }

    pub fn add_device(&mut self, device: InputDevice) {
        debug!("device {} added: {}", device.id, device.name);
        let plug_keyboard = device.is_alphabetic_keyboard() && !device.is_remote();
        let hotplug = InputHotplugEvent {
            kind: HotplugKind::PlugKeyboard,
            device_id: device.id,
            dhid: device.dhid(),
        };
        self.devices.insert(device.id, device);
        if plug_keyboard {
            self.sender.send(CooperateEvent::InputHotplug(hotplug));
        }
    }

    pub fn remove_device(&mut self, device_id: i32) {
        let Some(device) = self.devices.remove(&device_id) else {
            debug!("removal of unknown device {device_id} ignored");
            return;
        };
        debug!("device {device_id} removed: {}", device.name);
        let kind = if device.is_pointer {
            HotplugKind::UnplugPointer
        } else if device.is_alphabetic_keyboard() {
            HotplugKind::UnplugKeyboard
        } else {
            return;
        };
        self.sender.send(CooperateEvent::InputHotplug(InputHotplugEvent {
            kind,
            device_id,
            dhid: device.dhid(),
        }));
    }

    pub fn get(&self, device_id: i32) -> Option<&InputDevice> {
        self.devices.get(&device_id)
    }

    pub fn get_dhid(&self, device_id: i32) -> Option<Dhid> {
        self.get(device_id).map(InputDevice::dhid)
    }

    /// Returns `true` for a known local (non-virtual) pointer.
    pub fn is_local_pointer(&self, device_id: i32) -> bool {
        self.get(device_id)
            .map_or(false, |dev| dev.is_pointer && !dev.is_remote())
    }

    /// Returns `true` for a known virtual device mirroring a peer's device.
    pub fn is_remote(&self, device_id: i32) -> bool {
        self.get(device_id).map_or(false, InputDevice::is_remote)
    }

    /// Devices that travel with `pointer_id` when cooperation starts: the
    /// pointer itself plus every other alphabetic keyboard on the same
    /// network id.  Empty when `pointer_id` is not a known pointer.
    pub fn get_cooperate_devices(&self, pointer_id: i32, local: &NetworkId) -> Vec<InputDevice> {
        let Some(pointer) = self.get(pointer_id).filter(|dev| dev.is_pointer) else {
            return Vec::new();
        };
        let owner = owning_network(pointer, local);
        let mut devices = vec![pointer.clone()];
        devices.extend(
            self.devices
                .values()
                .filter(|dev| dev.id != pointer_id)
                .filter(|dev| dev.is_alphabetic_keyboard() && !dev.is_pointer)
                .filter(|dev| owning_network(dev, local) == owner)
                .cloned(),
        );
        devices
    }

    /// Dhids of [`Self::get_cooperate_devices`].
    pub fn get_cooperate_dhids(&self, pointer_id: i32, local: &NetworkId) -> Vec<Dhid> {
        self.get_cooperate_devices(pointer_id, local)
            .iter()
            .map(InputDevice::dhid)
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn dump(&self, out: &mut String) {
        let _ = writeln!(out, "  local devices: {}", self.devices.len());
        for dev in self.devices.values() {
            let _ = writeln!(
                out,
                "    {} '{}' pointer={} keyboard={:?} remote={}",
                dev.id,
                dev.name,
                dev.is_pointer,
                dev.keyboard_type,
                dev.is_remote()
            );
        }
    }
}

fn owning_network(dev: &InputDevice, local: &NetworkId) -> NetworkId {
    if dev.is_remote() {
        dev.network_id()
    } else {
        local.clone()
    }
}

#[cfg(test)]
mod tests {
    use coop_core::KeyboardType;

    use super::*;
    use crate::application::channel::{channel, EventReceiver};
    use crate::infrastructure::mock::FakeDeviceSource;

    fn mouse(id: i32) -> InputDevice {
        InputDevice {
            id,
            name: format!("Mouse {id}"),
            phys: format!("usb-{id}"),
            is_pointer: true,
            ..Default::default()
        }
    }

    fn keyboard(id: i32) -> InputDevice {
        InputDevice {
            id,
            name: format!("Keyboard {id}"),
            phys: format!("usb-{id}"),
            is_keyboard: true,
            keyboard_type: KeyboardType::AlphabeticKeyboard,
            ..Default::default()
        }
    }

    fn remote(mut dev: InputDevice, network: &str) -> InputDevice {
        dev.name = format!("DistributedInput {}", dev.name);
        dev.phys = format!("virtual|{network}|Input_remote{}", dev.id);
        dev
    }

    fn make_manager(devices: Vec<InputDevice>) -> (InputDeviceManager, EventReceiver) {
        let (tx, rx) = channel();
        let source = Arc::new(FakeDeviceSource::with_devices(devices));
        let mut mgr = InputDeviceManager::new(source, tx);
        mgr.enable().expect("enable");
        (mgr, rx)
    }

    #[test]
    fn test_cooperate_dhids_include_pointer_and_same_network_keyboards() {
        // Arrange
        let local = NetworkId::from("local");
        let mut digital = keyboard(4);
        digital.keyboard_type = KeyboardType::DigitalKeyboard;
        let (mgr, _rx) = make_manager(vec![
            mouse(1),
            keyboard(2),
            remote(keyboard(3), "peer-c"),
            digital,
        ]);

        // Act
        let dhids = mgr.get_cooperate_dhids(1, &local);

        // Assert
        assert_eq!(dhids, vec![mouse(1).dhid(), keyboard(2).dhid()]);
    }

    #[test]
    fn test_cooperate_dhids_for_remote_pointer_follow_its_network() {
        // Arrange
        let local = NetworkId::from("local");
        let (mgr, _rx) = make_manager(vec![
            remote(mouse(1), "peer-c"),
            keyboard(2),
            remote(keyboard(3), "peer-c"),
            remote(keyboard(5), "peer-d"),
        ]);

        // Act
        let dhids = mgr.get_cooperate_dhids(1, &local);

        // Assert
        assert_eq!(
            dhids,
            vec![Dhid::from("Input_remote1"), Dhid::from("Input_remote3")]
        );
    }

    #[test]
    fn test_cooperate_dhids_for_non_pointer_is_empty() {
        let (mgr, _rx) = make_manager(vec![keyboard(2)]);
        assert!(mgr.get_cooperate_dhids(2, &NetworkId::from("local")).is_empty());
        assert!(mgr.get_cooperate_dhids(99, &NetworkId::from("local")).is_empty());
    }

    #[test]
    fn test_plugging_local_keyboard_posts_hotplug() {
        // Arrange
        let (mut mgr, mut rx) = make_manager(Vec::new());

        // Act
        mgr.add_device(keyboard(7));
        mgr.add_device(mouse(8));

        // Assert
        match rx.try_recv() {
            Some(CooperateEvent::InputHotplug(ev)) => {
                assert_eq!(ev.kind, HotplugKind::PlugKeyboard);
                assert_eq!(ev.device_id, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_none());
        assert_eq!(mgr.device_count(), 2);
    }

    #[test]
    fn test_unplugging_pointer_posts_unplug_pointer() {
        let (mut mgr, mut rx) = make_manager(vec![mouse(1)]);
        mgr.remove_device(1);
        assert!(matches!(
            rx.try_recv(),
            Some(CooperateEvent::InputHotplug(InputHotplugEvent {
                kind: HotplugKind::UnplugPointer,
                device_id: 1,
                ..
            }))
        ));
        assert!(mgr.get(1).is_none());
    }
}
