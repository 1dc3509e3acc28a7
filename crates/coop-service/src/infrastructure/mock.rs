//! Recording doubles for every collaborator of the cooperate core.
//!
//! # Why doubles? (for beginners)
//!
//! The real collaborators move the OS pointer, open TCP sockets and start
//! tokio timers.  None of that is observable from a test.  The doubles below
//! replace each concern with in-memory recording:
//!
//! - every call is pushed into a `Mutex<Vec<...>>` the test can inspect;
//! - callbacks (monitors, interceptors, timers) are stored and fired by the
//!   test on demand, so timing is fully deterministic;
//! - the shared [`Journal`] records enable/disable calls across doubles,
//!   which lets tests assert ordering between collaborators.
//!
//! ```ignore
//! let mocks = MockCollaborators::new("local");
//! let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
//! ctx.enable().unwrap();
//! assert_eq!(mocks.journal()[0], "devices.enable");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use coop_core::protocol::codec::{decode_peer_message, encode_peer_message};
use coop_core::protocol::messages::{
    DSoftbusKeyEvent, DSoftbusPointerEvent, LocationInfo, PeerMessage,
};
use coop_core::{Coordinate, DisplayInfo, InputDevice, NetPacket, NetworkId, NormalizedCoordinate};

use crate::application::channel::EventSender;
use crate::application::collaborators::{
    BoardManager, ClientNotifier, CooperateObserver, DeviceProfile, DeviceSource, InputAdapter,
    InterceptCallback, InterceptedInput, PointerCallback, ProcessMonitor, SessionObserver,
    SessionTransport, TimerCallback, TimerId, TimerService,
};
use crate::application::context::Collaborators;
use crate::application::error::{CooperateError, InputError, TimerError, TransportError};
use crate::application::event::{CooperateEvent, InputPointerEvent};
use crate::application::event_manager::CoordinationMessage;
use crate::application::hot_area::HotAreaType;

/// Ordered log of enable/disable calls shared by several doubles.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ── Input ────────────────────────────────────────────────────────────────────

/// Input adapter that records pointer control and injection.
pub struct RecordingInput {
    pub display: Mutex<Option<DisplayInfo>>,
    pub pointer_locations: Mutex<Vec<Coordinate>>,
    pub pointer_visibility: Mutex<Vec<bool>>,
    pub virtual_devices: Mutex<BTreeMap<i32, InputDevice>>,
    pub simulated_pointers: Mutex<Vec<DSoftbusPointerEvent>>,
    pub simulated_keys: Mutex<Vec<DSoftbusKeyEvent>>,
    monitors: Mutex<BTreeMap<i32, PointerCallback>>,
    interceptors: Mutex<BTreeMap<i32, InterceptCallback>>,
    next_id: AtomicI32,
    /// When `true`, fallible methods return `InputError::Platform`.
    pub should_fail: AtomicBool,
}

impl Default for RecordingInput {
    fn default() -> Self {
        Self {
            display: Mutex::new(Some(DisplayInfo::new(1920, 1080))),
            pointer_locations: Mutex::default(),
            pointer_visibility: Mutex::default(),
            virtual_devices: Mutex::default(),
            simulated_pointers: Mutex::default(),
            simulated_keys: Mutex::default(),
            monitors: Mutex::default(),
            interceptors: Mutex::default(),
            next_id: AtomicI32::new(1000),
            should_fail: AtomicBool::new(false),
        }
    }
}

impl RecordingInput {
    fn check(&self) -> Result<(), InputError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(InputError::Platform("mock failure".into()));
        }
        Ok(())
    }

    /// Delivers a local pointer event to every monitor.
    pub fn emit_pointer(&self, event: InputPointerEvent) {
        let monitors: Vec<PointerCallback> = self.monitors.lock().unwrap().values().cloned().collect();
        for monitor in monitors {
            monitor(event);
        }
    }

    /// Delivers a local event to every interceptor.
    pub fn intercept(&self, input: InterceptedInput) {
        let interceptors: Vec<InterceptCallback> =
            self.interceptors.lock().unwrap().values().cloned().collect();
        for interceptor in interceptors {
            interceptor(input);
        }
    }

    pub fn has_monitor(&self) -> bool {
        !self.monitors.lock().unwrap().is_empty()
    }

    pub fn has_interceptor(&self) -> bool {
        !self.interceptors.lock().unwrap().is_empty()
    }

    /// Last visibility set, if any.
    pub fn pointer_visible(&self) -> Option<bool> {
        self.pointer_visibility.lock().unwrap().last().copied()
    }
}

impl InputAdapter for RecordingInput {
    fn add_monitor(&self, callback: PointerCallback) -> Result<i32, InputError> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.monitors.lock().unwrap().insert(id, callback);
        Ok(id)
    }

    fn remove_monitor(&self, monitor_id: i32) {
        self.monitors.lock().unwrap().remove(&monitor_id);
    }

    fn add_interceptor(&self, callback: InterceptCallback) -> Result<i32, InputError> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.interceptors.lock().unwrap().insert(id, callback);
        Ok(id)
    }

    fn remove_interceptor(&self, interceptor_id: i32) {
        self.interceptors.lock().unwrap().remove(&interceptor_id);
    }

    fn set_pointer_visible(&self, visible: bool) -> Result<(), InputError> {
        self.check()?;
        self.pointer_visibility.lock().unwrap().push(visible);
        Ok(())
    }

    fn set_pointer_location(&self, pos: Coordinate) -> Result<(), InputError> {
        self.check()?;
        self.pointer_locations.lock().unwrap().push(pos);
        Ok(())
    }

    fn default_display(&self) -> Option<DisplayInfo> {
        *self.display.lock().unwrap()
    }

    fn add_virtual_device(&self, device: &InputDevice) -> Result<i32, InputError> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.virtual_devices.lock().unwrap().insert(id, device.clone());
        Ok(id)
    }

    fn remove_virtual_device(&self, device_id: i32) {
        self.virtual_devices.lock().unwrap().remove(&device_id);
    }

    fn simulate_pointer_event(&self, event: &DSoftbusPointerEvent) -> Result<(), InputError> {
        self.check()?;
        self.simulated_pointers.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn simulate_key_event(&self, event: &DSoftbusKeyEvent) -> Result<(), InputError> {
        self.check()?;
        self.simulated_keys.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Device source with a scripted device list.
#[derive(Default)]
pub struct FakeDeviceSource {
    devices: Mutex<Vec<InputDevice>>,
    sender: Mutex<Option<EventSender>>,
    journal: Journal,
}

impl FakeDeviceSource {
    pub fn with_devices(devices: Vec<InputDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    /// Adds a device reported by the next `enable`.
    pub fn push(&self, device: InputDevice) {
        self.devices.lock().unwrap().push(device);
    }

    /// Hot-plugs a device while enabled.
    pub fn plug(&self, device: InputDevice) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            sender.send(CooperateEvent::InputDeviceAdded(device));
        }
    }

    pub fn unplug(&self, device_id: i32) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            sender.send(CooperateEvent::InputDeviceRemoved { device_id });
        }
    }
}

impl DeviceSource for FakeDeviceSource {
    fn enable(&self, sender: EventSender) -> Result<Vec<InputDevice>, InputError> {
        self.journal.record("devices.enable");
        *self.sender.lock().unwrap() = Some(sender);
        Ok(self.devices.lock().unwrap().clone())
    }

    fn disable(&self) {
        self.journal.record("devices.disable");
        self.sender.lock().unwrap().take();
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Session transport that records decoded outbound messages.
pub struct RecordingTransport {
    local: NetworkId,
    fail_enable: AtomicBool,
    fail_open: Mutex<BTreeSet<NetworkId>>,
    fail_send: Mutex<BTreeSet<NetworkId>>,
    pub sessions: Mutex<BTreeSet<NetworkId>>,
    pub opened: Mutex<Vec<NetworkId>>,
    pub closed: Mutex<Vec<NetworkId>>,
    sent: Mutex<Vec<(NetworkId, PeerMessage)>>,
    observers: Mutex<Vec<Weak<dyn SessionObserver>>>,
    journal: Journal,
}

impl RecordingTransport {
    pub fn new(local: &str) -> Self {
        Self {
            local: NetworkId::from(local),
            fail_enable: AtomicBool::new(false),
            fail_open: Mutex::default(),
            fail_send: Mutex::default(),
            sessions: Mutex::default(),
            opened: Mutex::default(),
            closed: Mutex::default(),
            sent: Mutex::default(),
            observers: Mutex::default(),
            journal: Journal::default(),
        }
    }

    pub fn fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    /// Makes `open_session` to `peer` fail.
    pub fn fail_open_to(&self, peer: &str) {
        self.fail_open.lock().unwrap().insert(NetworkId::from(peer));
    }

    /// Makes every send to `peer` fail while its session stays open.
    pub fn fail_send_to(&self, peer: &str) {
        self.fail_send.lock().unwrap().insert(NetworkId::from(peer));
    }

    pub fn sent_to(&self, peer: &NetworkId) -> Vec<PeerMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == peer)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn all_sent(&self) -> Vec<(NetworkId, PeerMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Feeds an inbound message from `from` to the observers.  The session
    /// with `from` is considered open afterwards.
    pub fn deliver(&self, from: &str, msg: &PeerMessage) -> bool {
        let from = NetworkId::from(from);
        self.sessions.lock().unwrap().insert(from.clone());
        let packet = encode_peer_message(msg);
        for observer in self.live_observers() {
            if observer.on_packet(&from, &packet) {
                return true;
            }
        }
        false
    }

    /// Simulates the peer dropping its session.
    pub fn shutdown(&self, peer: &str) {
        let peer = NetworkId::from(peer);
        self.sessions.lock().unwrap().remove(&peer);
        for observer in self.live_observers() {
            observer.on_shutdown(&peer);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.live_observers().len()
    }

    fn live_observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.observers
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl SessionTransport for RecordingTransport {
    fn enable(&self) -> Result<(), TransportError> {
        self.journal.record("transport.enable");
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(TransportError::BindFailed("mock failure".into()));
        }
        Ok(())
    }

    fn disable(&self) {
        self.journal.record("transport.disable");
        self.sessions.lock().unwrap().clear();
    }

    fn open_session(&self, network_id: &NetworkId) -> Result<(), TransportError> {
        if self.fail_open.lock().unwrap().contains(network_id) {
            return Err(TransportError::open_failed(network_id, "mock failure"));
        }
        if self.sessions.lock().unwrap().insert(network_id.clone()) {
            self.opened.lock().unwrap().push(network_id.clone());
        }
        Ok(())
    }

    fn close_session(&self, network_id: &NetworkId) {
        if self.sessions.lock().unwrap().remove(network_id) {
            self.closed.lock().unwrap().push(network_id.clone());
        }
    }

    fn has_session(&self, network_id: &NetworkId) -> bool {
        self.sessions.lock().unwrap().contains(network_id)
    }

    fn send_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> Result<(), TransportError> {
        if !self.has_session(network_id) {
            return Err(TransportError::SessionNotFound(network_id.anonymized()));
        }
        if self.fail_send.lock().unwrap().contains(network_id) {
            return Err(TransportError::SendFailed {
                peer: network_id.anonymized(),
                reason: "mock failure".into(),
            });
        }
        let msg = decode_peer_message(packet)?;
        self.sent.lock().unwrap().push((network_id.clone(), msg));
        Ok(())
    }

    fn local_network_id(&self) -> NetworkId {
        self.local.clone()
    }

    fn add_observer(&self, observer: Weak<dyn SessionObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn remove_observer(&self, observer: &Weak<dyn SessionObserver>) {
        self.observers
            .lock()
            .unwrap()
            .retain(|o| !Weak::ptr_eq(o, observer));
    }
}

// ── Boards, profiles, processes ──────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBoards {
    sender: Mutex<Option<EventSender>>,
    journal: Journal,
}

impl FakeBoards {
    pub fn online(&self, network_id: &str) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            sender.send(CooperateEvent::DdmBoardOnline {
                network_id: NetworkId::from(network_id),
            });
        }
    }

    pub fn offline(&self, network_id: &str) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            sender.send(CooperateEvent::DdmBoardOffline {
                network_id: NetworkId::from(network_id),
            });
        }
    }
}

impl BoardManager for FakeBoards {
    fn enable(&self, sender: EventSender) -> Result<(), CooperateError> {
        self.journal.record("boards.enable");
        *self.sender.lock().unwrap() = Some(sender);
        Ok(())
    }

    fn disable(&self) {
        self.journal.record("boards.disable");
        self.sender.lock().unwrap().take();
    }
}

/// Profile store where every switch is on unless a test turns it off.
#[derive(Default)]
pub struct FakeProfiles {
    switches: Mutex<BTreeMap<NetworkId, bool>>,
    pub watches: Mutex<BTreeSet<NetworkId>>,
    sender: Mutex<Option<EventSender>>,
    journal: Journal,
}

impl FakeProfiles {
    /// Flips a switch and posts the change.
    pub fn set_switch(&self, network_id: &str, on: bool) {
        let network_id = NetworkId::from(network_id);
        self.switches.lock().unwrap().insert(network_id.clone(), on);
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            sender.send(CooperateEvent::DdpCooperateSwitchChanged {
                network_id,
                normal: on,
            });
        }
    }

    pub fn is_watching(&self, network_id: &str) -> bool {
        self.watches
            .lock()
            .unwrap()
            .contains(&NetworkId::from(network_id))
    }
}

impl DeviceProfile for FakeProfiles {
    fn enable(&self, sender: EventSender) -> Result<(), CooperateError> {
        self.journal.record("profiles.enable");
        *self.sender.lock().unwrap() = Some(sender);
        Ok(())
    }

    fn disable(&self) {
        self.journal.record("profiles.disable");
        self.sender.lock().unwrap().take();
    }

    fn is_cooperate_switch_on(&self, network_id: &NetworkId) -> bool {
        self.switches
            .lock()
            .unwrap()
            .get(network_id)
            .copied()
            .unwrap_or(true)
    }

    fn add_watch(&self, network_id: &NetworkId) {
        self.watches.lock().unwrap().insert(network_id.clone());
    }

    fn remove_watch(&self, network_id: &NetworkId) {
        self.watches.lock().unwrap().remove(network_id);
    }
}

#[derive(Default)]
pub struct FakeProcessMonitor {
    watched: Mutex<BTreeMap<i32, EventSender>>,
}

impl FakeProcessMonitor {
    /// Simulates the death of `pid`.
    pub fn kill(&self, pid: i32) {
        if let Some(sender) = self.watched.lock().unwrap().remove(&pid) {
            sender.send(CooperateEvent::AppClosed { pid });
        }
    }

    pub fn is_watching(&self, pid: i32) -> bool {
        self.watched.lock().unwrap().contains_key(&pid)
    }
}

impl ProcessMonitor for FakeProcessMonitor {
    fn watch(&self, pid: i32, sender: EventSender) {
        self.watched.lock().unwrap().insert(pid, sender);
    }

    fn unwatch(&self, pid: i32) {
        self.watched.lock().unwrap().remove(&pid);
    }
}

// ── Clients ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifiedMessage {
    pub pid: i32,
    pub user_data: i32,
    pub network_id: NetworkId,
    pub msg: CoordinationMessage,
    pub err_code: i32,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<NotifiedMessage>>,
    pub hot_areas: Mutex<Vec<(i32, HotAreaType, bool)>>,
    pub locations: Mutex<Vec<(i32, NetworkId, LocationInfo)>>,
}

impl RecordingNotifier {
    /// Messages delivered to `pid`, in order.
    pub fn messages_for(&self, pid: i32) -> Vec<CoordinationMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.pid == pid)
            .map(|m| m.msg)
            .collect()
    }
}

impl ClientNotifier for RecordingNotifier {
    fn notify_coordination_message(
        &self,
        pid: i32,
        user_data: i32,
        network_id: &NetworkId,
        msg: CoordinationMessage,
        err_code: i32,
    ) {
        self.messages.lock().unwrap().push(NotifiedMessage {
            pid,
            user_data,
            network_id: network_id.clone(),
            msg,
            err_code,
        });
    }

    fn notify_hot_area(&self, pid: i32, area: HotAreaType, is_edge: bool) {
        self.hot_areas.lock().unwrap().push((pid, area, is_edge));
    }

    fn notify_mouse_location(&self, pid: i32, network_id: &NetworkId, location: LocationInfo) {
        self.locations
            .lock()
            .unwrap()
            .push((pid, network_id.clone(), location));
    }
}

/// Observer recording transitions, with a switchable veto.
pub struct RecordingObserver {
    pub allow: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self {
            allow: AtomicBool::new(true),
            calls: Mutex::default(),
        }
    }
}

impl RecordingObserver {
    fn record(&self, call: &str, remote: &NetworkId) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{call}:{}", remote.as_str()));
    }
}

impl CooperateObserver for RecordingObserver {
    fn is_allow_cooperate(&self) -> bool {
        self.allow.load(Ordering::SeqCst)
    }

    fn on_transition_out(&self, remote: &NetworkId, _cursor: NormalizedCoordinate) {
        self.record("out", remote);
    }

    fn on_transition_in(&self, remote: &NetworkId, _cursor: NormalizedCoordinate) {
        self.record("in", remote);
    }

    fn on_back(&self, remote: &NetworkId, _cursor: NormalizedCoordinate) {
        self.record("back", remote);
    }

    fn on_relay(&self, remote: &NetworkId, _cursor: NormalizedCoordinate) {
        self.record("relay", remote);
    }

    fn on_reset(&self) {
        self.calls.lock().unwrap().push("reset".to_string());
    }
}

// ── Timers ───────────────────────────────────────────────────────────────────

struct ManualTimer {
    interval_ms: u64,
    repeat: i32,
    callback: TimerCallback,
}

/// Timer service fired by hand.
#[derive(Default)]
pub struct ManualTimers {
    timers: Mutex<BTreeMap<TimerId, ManualTimer>>,
    pub resets: Mutex<Vec<TimerId>>,
}

impl ManualTimers {
    pub const MAX_TIMERS: usize = 64;

    /// Fires one timer.  Returns `false` when it does not exist.
    pub fn fire(&self, timer_id: TimerId) -> bool {
        let callback = {
            let mut timers = self.timers.lock().unwrap();
            let Some(timer) = timers.get_mut(&timer_id) else {
                return false;
            };
            let callback = Arc::clone(&timer.callback);
            if timer.repeat == 1 {
                timers.remove(&timer_id);
            } else if timer.repeat > 1 {
                timer.repeat -= 1;
            }
            callback
        };
        callback();
        true
    }

    pub fn fire_all(&self) {
        for id in self.active() {
            self.fire(id);
        }
    }

    pub fn active(&self) -> Vec<TimerId> {
        self.timers.lock().unwrap().keys().copied().collect()
    }

    pub fn interval_of(&self, timer_id: TimerId) -> Option<u64> {
        self.timers
            .lock()
            .unwrap()
            .get(&timer_id)
            .map(|t| t.interval_ms)
    }
}

impl TimerService for ManualTimers {
    fn add_timer(
        &self,
        interval_ms: u64,
        repeat: i32,
        callback: TimerCallback,
    ) -> Result<TimerId, TimerError> {
        let mut timers = self.timers.lock().unwrap();
        if timers.len() >= Self::MAX_TIMERS {
            return Err(TimerError::TooManyTimers(Self::MAX_TIMERS));
        }
        let id = (0..).find(|id| !timers.contains_key(id)).unwrap_or_default();
        timers.insert(
            id,
            ManualTimer {
                interval_ms,
                repeat,
                callback,
            },
        );
        Ok(id)
    }

    fn remove_timer(&self, timer_id: TimerId) -> Result<(), TimerError> {
        self.timers
            .lock()
            .unwrap()
            .remove(&timer_id)
            .map(|_| ())
            .ok_or(TimerError::NotFound(timer_id))
    }

    fn reset_timer(&self, timer_id: TimerId) -> Result<(), TimerError> {
        if !self.is_exist(timer_id) {
            return Err(TimerError::NotFound(timer_id));
        }
        self.resets.lock().unwrap().push(timer_id);
        Ok(())
    }

    fn is_exist(&self, timer_id: TimerId) -> bool {
        self.timers.lock().unwrap().contains_key(&timer_id)
    }
}

// ── Bundle ───────────────────────────────────────────────────────────────────

/// One of each double, sharing a [`Journal`].
pub struct MockCollaborators {
    pub input: Arc<RecordingInput>,
    pub devices: Arc<FakeDeviceSource>,
    pub transport: Arc<RecordingTransport>,
    pub boards: Arc<FakeBoards>,
    pub profiles: Arc<FakeProfiles>,
    pub timers: Arc<ManualTimers>,
    pub notifier: Arc<RecordingNotifier>,
    pub processes: Arc<FakeProcessMonitor>,
    journal: Journal,
}

impl MockCollaborators {
    pub fn new(local: &str) -> Self {
        let journal = Journal::default();
        Self {
            input: Arc::new(RecordingInput::default()),
            devices: Arc::new(FakeDeviceSource {
                journal: journal.clone(),
                ..Default::default()
            }),
            transport: Arc::new(RecordingTransport {
                journal: journal.clone(),
                ..RecordingTransport::new(local)
            }),
            boards: Arc::new(FakeBoards {
                journal: journal.clone(),
                ..Default::default()
            }),
            profiles: Arc::new(FakeProfiles {
                journal: journal.clone(),
                ..Default::default()
            }),
            timers: Arc::new(ManualTimers::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            processes: Arc::new(FakeProcessMonitor::default()),
            journal,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            input: self.input.clone(),
            devices: self.devices.clone(),
            transport: self.transport.clone(),
            boards: self.boards.clone(),
            profiles: self.profiles.clone(),
            timers: self.timers.clone(),
            notifier: self.notifier.clone(),
            processes: self.processes.clone(),
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.entries()
    }
}
