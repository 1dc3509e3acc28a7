//! Collaborators for a daemon without a platform input stack.
//!
//! `cooperated` runs the full protocol and state machine, but on a host
//! where it cannot hook the OS input pipeline.  The adapters here keep the
//! state a real platform would hold (pointer position and visibility,
//! virtual devices, registered hooks) and log every injected event, so the
//! protocol can be exercised end to end between machines.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use coop_core::protocol::messages::{DSoftbusKeyEvent, DSoftbusPointerEvent, LocationInfo};
use coop_core::{Coordinate, DisplayInfo, InputDevice, NetworkId};
use tracing::{debug, info};

use crate::application::channel::EventSender;
use crate::application::collaborators::{
    BoardManager, ClientNotifier, DeviceProfile, DeviceSource, InputAdapter, InterceptCallback,
    PointerCallback, ProcessMonitor,
};
use crate::application::error::{CooperateError, InputError};
use crate::application::event::CooperateEvent;
use crate::application::event_manager::CoordinationMessage;
use crate::application::hot_area::HotAreaType;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Input ────────────────────────────────────────────────────────────────────

pub struct HeadlessInput {
    display: DisplayInfo,
    location: Mutex<Coordinate>,
    visible: Mutex<bool>,
    monitors: Mutex<BTreeMap<i32, PointerCallback>>,
    interceptors: Mutex<BTreeMap<i32, InterceptCallback>>,
    virtual_devices: Mutex<BTreeMap<i32, InputDevice>>,
    next_id: AtomicI32,
}

impl HeadlessInput {
    pub fn new(display: DisplayInfo) -> Self {
        Self {
            display,
            location: Mutex::new(Coordinate::new(display.width / 2, display.height / 2)),
            visible: Mutex::new(true),
            monitors: Mutex::default(),
            interceptors: Mutex::default(),
            virtual_devices: Mutex::default(),
            next_id: AtomicI32::new(1),
        }
    }

    pub fn pointer_location(&self) -> Coordinate {
        *lock(&self.location)
    }

    pub fn is_pointer_visible(&self) -> bool {
        *lock(&self.visible)
    }

    pub fn virtual_device_count(&self) -> usize {
        lock(&self.virtual_devices).len()
    }

    pub fn is_intercepting(&self) -> bool {
        !lock(&self.interceptors).is_empty()
    }

    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl InputAdapter for HeadlessInput {
    fn add_monitor(&self, callback: PointerCallback) -> Result<i32, InputError> {
        let id = self.next_id();
        lock(&self.monitors).insert(id, callback);
        Ok(id)
    }

    fn remove_monitor(&self, monitor_id: i32) {
        lock(&self.monitors).remove(&monitor_id);
    }

    fn add_interceptor(&self, callback: InterceptCallback) -> Result<i32, InputError> {
        let id = self.next_id();
        lock(&self.interceptors).insert(id, callback);
        Ok(id)
    }

    fn remove_interceptor(&self, interceptor_id: i32) {
        lock(&self.interceptors).remove(&interceptor_id);
    }

    fn set_pointer_visible(&self, visible: bool) -> Result<(), InputError> {
        debug!("pointer visible: {visible}");
        *lock(&self.visible) = visible;
        Ok(())
    }

    fn set_pointer_location(&self, pos: Coordinate) -> Result<(), InputError> {
        if pos.x < 0 || pos.y < 0 || pos.x > self.display.width || pos.y > self.display.height {
            return Err(InputError::Platform(format!(
                "({}, {}) is outside the display",
                pos.x, pos.y
            )));
        }
        *lock(&self.location) = pos;
        Ok(())
    }

    fn default_display(&self) -> Option<DisplayInfo> {
        Some(self.display)
    }

    fn add_virtual_device(&self, device: &InputDevice) -> Result<i32, InputError> {
        let id = self.next_id();
        info!("virtual device {id} mirrors {}", device.name);
        lock(&self.virtual_devices).insert(id, device.clone());
        Ok(id)
    }

    fn remove_virtual_device(&self, device_id: i32) {
        if lock(&self.virtual_devices).remove(&device_id).is_none() {
            debug!("virtual device {device_id} already gone");
        }
    }

    fn simulate_pointer_event(&self, event: &DSoftbusPointerEvent) -> Result<(), InputError> {
        debug!(?event, "remote pointer event");
        Ok(())
    }

    fn simulate_key_event(&self, event: &DSoftbusKeyEvent) -> Result<(), InputError> {
        debug!(?event, "remote key event");
        Ok(())
    }
}

/// No local input devices are attached on a headless host.
#[derive(Default)]
pub struct StaticDeviceSource {
    devices: Vec<InputDevice>,
}

impl StaticDeviceSource {
    pub fn new(devices: Vec<InputDevice>) -> Self {
        Self { devices }
    }
}

impl DeviceSource for StaticDeviceSource {
    fn enable(&self, _sender: EventSender) -> Result<Vec<InputDevice>, InputError> {
        Ok(self.devices.clone())
    }

    fn disable(&self) {}
}

// ── Boards and profiles ──────────────────────────────────────────────────────

/// Treats every configured peer as an online board.
pub struct ConfiguredBoards {
    peers: Vec<NetworkId>,
    sender: Mutex<Option<EventSender>>,
}

impl ConfiguredBoards {
    pub fn new(peers: Vec<NetworkId>) -> Self {
        Self {
            peers,
            sender: Mutex::new(None),
        }
    }

    /// Reports `network_id` as gone.
    pub fn offline(&self, network_id: &NetworkId) {
        if let Some(sender) = lock(&self.sender).as_ref() {
            sender.send(CooperateEvent::DdmBoardOffline {
                network_id: network_id.clone(),
            });
        }
    }
}

impl BoardManager for ConfiguredBoards {
    fn enable(&self, sender: EventSender) -> Result<(), CooperateError> {
        for network_id in &self.peers {
            sender.send(CooperateEvent::DdmBoardOnline {
                network_id: network_id.clone(),
            });
        }
        *lock(&self.sender) = Some(sender);
        Ok(())
    }

    fn disable(&self) {
        lock(&self.sender).take();
    }
}

/// Every peer has its cooperate switch on.
#[derive(Default)]
pub struct LocalDeviceProfile {
    watches: Mutex<BTreeSet<NetworkId>>,
}

impl LocalDeviceProfile {
    pub fn is_watching(&self, network_id: &NetworkId) -> bool {
        lock(&self.watches).contains(network_id)
    }
}

impl DeviceProfile for LocalDeviceProfile {
    fn enable(&self, _sender: EventSender) -> Result<(), CooperateError> {
        Ok(())
    }

    fn disable(&self) {
        lock(&self.watches).clear();
    }

    fn is_cooperate_switch_on(&self, _network_id: &NetworkId) -> bool {
        true
    }

    fn add_watch(&self, network_id: &NetworkId) {
        lock(&self.watches).insert(network_id.clone());
    }

    fn remove_watch(&self, network_id: &NetworkId) {
        lock(&self.watches).remove(network_id);
    }
}

// ── Clients ──────────────────────────────────────────────────────────────────

/// Clients live in the same process, so nothing ever dies independently.
pub struct HeadlessProcessMonitor;

impl ProcessMonitor for HeadlessProcessMonitor {
    fn watch(&self, pid: i32, _sender: EventSender) {
        debug!("watching client {pid}");
    }

    fn unwatch(&self, pid: i32) {
        debug!("no longer watching client {pid}");
    }
}

/// Writes client notifications to the log.
pub struct LoggingNotifier;

impl ClientNotifier for LoggingNotifier {
    fn notify_coordination_message(
        &self,
        pid: i32,
        user_data: i32,
        network_id: &NetworkId,
        msg: CoordinationMessage,
        err_code: i32,
    ) {
        info!(
            pid,
            user_data,
            err_code,
            "{msg:?} for {}",
            network_id.anonymized()
        );
    }

    fn notify_hot_area(&self, pid: i32, area: HotAreaType, is_edge: bool) {
        debug!(pid, is_edge, "hot area {area:?}");
    }

    fn notify_mouse_location(&self, pid: i32, network_id: &NetworkId, location: LocationInfo) {
        debug!(pid, ?location, "mouse location of {}", network_id.anonymized());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::application::channel::channel;

    use super::*;

    #[test]
    fn test_pointer_starts_centred_and_visible() {
        let input = HeadlessInput::new(DisplayInfo::new(1920, 1080));
        assert_eq!(input.pointer_location(), Coordinate::new(960, 540));
        assert!(input.is_pointer_visible());
        assert_eq!(input.default_display(), Some(DisplayInfo::new(1920, 1080)));
    }

    #[test]
    fn test_pointer_location_outside_display_is_rejected() {
        // Arrange
        let input = HeadlessInput::new(DisplayInfo::new(800, 600));

        // Act
        let result = input.set_pointer_location(Coordinate::new(900, 10));

        // Assert
        assert!(matches!(result, Err(InputError::Platform(_))));
        assert_eq!(input.pointer_location(), Coordinate::new(400, 300));
    }

    #[test]
    fn test_hooks_and_virtual_devices_are_tracked() {
        // Arrange
        let input = HeadlessInput::new(DisplayInfo::new(800, 600));
        let interceptor = input
            .add_interceptor(Arc::new(|_| {}))
            .expect("interceptor");
        let device = input
            .add_virtual_device(&InputDevice::default())
            .expect("device");

        // Act
        input.remove_interceptor(interceptor);

        // Assert
        assert!(!input.is_intercepting());
        assert_eq!(input.virtual_device_count(), 1);
        input.remove_virtual_device(device);
        assert_eq!(input.virtual_device_count(), 0);
    }

    #[test]
    fn test_configured_boards_come_online_on_enable() {
        // Arrange
        let boards = ConfiguredBoards::new(vec![NetworkId::from("peer-b"), NetworkId::from("peer-c")]);
        let (tx, mut rx) = channel();

        // Act
        boards.enable(tx).expect("enable");
        boards.offline(&NetworkId::from("peer-b"));

        // Assert
        assert!(matches!(
            rx.try_recv(),
            Some(CooperateEvent::DdmBoardOnline { network_id }) if network_id == NetworkId::from("peer-b")
        ));
        assert!(matches!(
            rx.try_recv(),
            Some(CooperateEvent::DdmBoardOnline { network_id }) if network_id == NetworkId::from("peer-c")
        ));
        assert!(matches!(
            rx.try_recv(),
            Some(CooperateEvent::DdmBoardOffline { network_id }) if network_id == NetworkId::from("peer-b")
        ));
    }

    #[test]
    fn test_profile_watches_are_cleared_on_disable() {
        let profile = LocalDeviceProfile::default();
        profile.add_watch(&NetworkId::from("peer-b"));
        assert!(profile.is_watching(&NetworkId::from("peer-b")));
        assert!(profile.is_cooperate_switch_on(&NetworkId::from("peer-b")));
        profile.disable();
        assert!(!profile.is_watching(&NetworkId::from("peer-b")));
    }
}
