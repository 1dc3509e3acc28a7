//! Mutable state shared by every cooperate state.
//!
//! The [`Context`] is owned by the worker thread and lent to the state
//! machine for the duration of one event.  It holds:
//!
//! - who is cooperating with whom (`local`, `origin`, `peer`);
//! - what started it (`start_device_id`, `start_device_dhid`);
//! - the last known cursor position and the cooperate flag;
//! - the helper sub-objects (listeners, devices, sessions, pending requests);
//! - handles to every outside collaborator.
//!
//! An empty peer id means no cooperation is established.

use std::fmt::Write as _;
use std::sync::Arc;

use coop_core::protocol::messages::{DSoftbusStartCooperate, DSoftbusStartCooperateFinished};
use coop_core::{Dhid, DisplayInfo, NetworkId, NormalizedCoordinate};
use tracing::{debug, info, warn};

use crate::application::channel::EventSender;
use crate::application::collaborators::{
    BoardManager, ClientNotifier, CooperateObserver, DeviceProfile, DeviceSource, InputAdapter,
    ProcessMonitor, SessionTransport, TimerId, TimerService,
};
use crate::application::dsoftbus_handler::DSoftbusHandler;
use crate::application::error::{CooperateError, InputError, TimerError};
use crate::application::event::{
    CooperateEvent, InputPointerEvent, ProtocolStep, ProtocolTimeoutEvent,
};
use crate::application::event_manager::EventManager;
use crate::application::hot_area::HotArea;
use crate::application::input_device_manager::InputDeviceManager;
use crate::application::mouse_location::MouseLocation;
use crate::application::pending::{PendingRequest, PendingRequests, RequestKey};
use crate::application::remote_devices::RemoteDeviceRegistry;

/// Cooperate flag bit: keep the pointer hidden after entering `IN`.
pub const HIDE_CURSOR: u32 = 0x1;

/// Display assumed when the input adapter reports none.
const FALLBACK_DISPLAY: DisplayInfo = DisplayInfo {
    width: 1920,
    height: 1080,
};

/// Every outside collaborator the cooperate core needs.
#[derive(Clone)]
pub struct Collaborators {
    pub input: Arc<dyn InputAdapter>,
    pub devices: Arc<dyn DeviceSource>,
    pub transport: Arc<dyn SessionTransport>,
    pub boards: Arc<dyn BoardManager>,
    pub profiles: Arc<dyn DeviceProfile>,
    pub timers: Arc<dyn TimerService>,
    pub notifier: Arc<dyn ClientNotifier>,
    pub processes: Arc<dyn ProcessMonitor>,
}

/// Tunables taken from the `[cooperate]` and `[display]` config sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub handshake_timeout_ms: u64,
    pub relay_timeout_ms: u64,
    pub hot_area_margin: i32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 3000,
            relay_timeout_ms: 3000,
            hot_area_margin: 100,
        }
    }
}

pub struct Context {
    sender: EventSender,
    local: NetworkId,
    origin_network_id: NetworkId,
    remote_network_id: NetworkId,
    start_device_id: i32,
    start_device_dhid: Dhid,
    cursor_pos: NormalizedCoordinate,
    flag: u32,
    options: ContextOptions,
    observers: Vec<Arc<dyn CooperateObserver>>,

    pub(crate) event_mgr: EventManager,
    pub(crate) hot_area: HotArea,
    pub(crate) mouse_location: MouseLocation,
    pub(crate) device_mgr: InputDeviceManager,
    pub(crate) remote_devices: RemoteDeviceRegistry,
    pub(crate) dsoftbus: DSoftbusHandler,
    pub(crate) pending: PendingRequests,

    input: Arc<dyn InputAdapter>,
    boards: Arc<dyn BoardManager>,
    profiles: Arc<dyn DeviceProfile>,
    timers: Arc<dyn TimerService>,
    processes: Arc<dyn ProcessMonitor>,
}

impl Context {
    pub fn new(sender: EventSender, collaborators: Collaborators, options: ContextOptions) -> Self {
        let Collaborators {
            input,
            devices,
            transport,
            boards,
            profiles,
            timers,
            notifier,
            processes,
        } = collaborators;
        let local = transport.local_network_id();
        Self {
            origin_network_id: NetworkId::empty(),
            remote_network_id: NetworkId::empty(),
            start_device_id: -1,
            start_device_dhid: Dhid::default(),
            cursor_pos: NormalizedCoordinate::default(),
            flag: 0,
            options,
            observers: Vec::new(),
            event_mgr: EventManager::new(notifier.clone()),
            hot_area: HotArea::new(notifier.clone(), options.hot_area_margin),
            mouse_location: MouseLocation::new(notifier, local.clone()),
            device_mgr: InputDeviceManager::new(devices, sender.clone()),
            remote_devices: RemoteDeviceRegistry::new(),
            dsoftbus: DSoftbusHandler::new(transport, sender.clone()),
            pending: PendingRequests::new(),
            input,
            boards,
            profiles,
            timers,
            processes,
            sender,
            local,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Enables device manager, session transport, boards and profiles, in
    /// that order.  On failure whatever was enabled is disabled again.
    pub fn enable(&mut self) -> Result<(), CooperateError> {
        self.device_mgr.enable()?;
        if let Err(e) = self.dsoftbus.enable() {
            self.device_mgr.disable();
            return Err(e.into());
        }
        if let Err(e) = self.boards.enable(self.sender.clone()) {
            self.dsoftbus.disable();
            self.device_mgr.disable();
            return Err(e);
        }
        if let Err(e) = self.profiles.enable(self.sender.clone()) {
            self.boards.disable();
            self.dsoftbus.disable();
            self.device_mgr.disable();
            return Err(e);
        }
        info!("cooperate context enabled as {}", self.local.anonymized());
        Ok(())
    }

    /// Reverse of [`Context::enable`].
    pub fn disable(&mut self) {
        self.profiles.disable();
        self.boards.disable();
        self.dsoftbus.disable();
        self.device_mgr.disable();
        info!("cooperate context disabled");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    pub fn local(&self) -> &NetworkId {
        &self.local
    }

    pub fn origin(&self) -> &NetworkId {
        &self.origin_network_id
    }

    /// The bound peer; empty when none.
    pub fn peer(&self) -> &NetworkId {
        &self.remote_network_id
    }

    pub fn is_local(&self, network_id: &NetworkId) -> bool {
        *network_id == self.local
    }

    /// `true` only for the currently bound peer.
    pub fn is_peer(&self, network_id: &NetworkId) -> bool {
        !self.remote_network_id.is_empty() && *network_id == self.remote_network_id
    }

    pub fn start_device_id(&self) -> i32 {
        self.start_device_id
    }

    pub fn start_device_dhid(&self) -> &Dhid {
        &self.start_device_dhid
    }

    pub fn cursor_position(&self) -> NormalizedCoordinate {
        self.cursor_pos
    }

    pub fn cooperate_flag(&self) -> u32 {
        self.flag
    }

    pub fn need_hide_cursor(&self) -> bool {
        self.flag & HIDE_CURSOR != 0
    }

    pub fn options(&self) -> ContextOptions {
        self.options
    }

    pub fn input(&self) -> &Arc<dyn InputAdapter> {
        &self.input
    }

    pub fn profiles(&self) -> &Arc<dyn DeviceProfile> {
        &self.profiles
    }

    pub fn processes(&self) -> &Arc<dyn ProcessMonitor> {
        &self.processes
    }

    pub fn transport(&self) -> Arc<dyn SessionTransport> {
        Arc::clone(self.dsoftbus.transport())
    }

    pub fn display(&self) -> DisplayInfo {
        self.input.default_display().unwrap_or(FALLBACK_DISPLAY)
    }

    // ── Binding ──────────────────────────────────────────────────────────────

    /// Records a local start: validates the start device and binds `remote`.
    pub fn start_cooperate(
        &mut self,
        remote: &NetworkId,
        start_device_id: i32,
    ) -> Result<(), CooperateError> {
        if remote.is_empty() || self.is_local(remote) {
            return Err(CooperateError::InvalidNetworkId);
        }
        let device = self
            .device_mgr
            .get(start_device_id)
            .filter(|dev| dev.is_pointer)
            .ok_or(CooperateError::InvalidDevice(start_device_id))?;
        self.origin_network_id = if device.is_remote() {
            device.network_id()
        } else {
            self.local.clone()
        };
        self.start_device_dhid = device.dhid();
        self.start_device_id = start_device_id;
        self.remote_network_id = remote.clone();
        Ok(())
    }

    /// Binds the sender of a `START_COOPERATE`, or the origin it names when
    /// the packet was relayed on the origin's behalf.
    pub fn remote_start(&mut self, event: &DSoftbusStartCooperate) {
        let relayed = !event.origin_network_id.is_empty()
            && event.origin_network_id != event.network_id
            && !self.is_local(&event.origin_network_id);
        self.remote_network_id = if relayed {
            event.origin_network_id.clone()
        } else {
            event.network_id.clone()
        };
        self.origin_network_id = if event.origin_network_id.is_empty() {
            event.network_id.clone()
        } else {
            event.origin_network_id.clone()
        };
        self.start_device_dhid = event.start_device_dhid.clone();
        self.cursor_pos = event.cursor_pos;
        self.flag = event.flag;
        debug!(
            "bound to {} (origin {})",
            self.remote_network_id.anonymized(),
            self.origin_network_id.anonymized()
        );
    }

    /// Adopts what the peer reported when it entered `IN`.
    pub fn remote_start_success(&mut self, event: &DSoftbusStartCooperateFinished) {
        self.start_device_dhid = event.start_device_dhid.clone();
        self.cursor_pos = event.cursor_pos;
        if let Err(e) = self.set_cursor_position(event.cursor_pos) {
            warn!("moving the cursor failed: {e}");
        }
    }

    /// Rebinds to `target` after a relay.
    pub fn relay_cooperate(&mut self, target: &NetworkId) {
        info!(
            "relay: {} -> {}",
            self.remote_network_id.anonymized(),
            target.anonymized()
        );
        self.remote_network_id = target.clone();
    }

    /// Forgets the current cooperation.
    pub fn reset_cooperation(&mut self) {
        self.remote_network_id = NetworkId::empty();
        self.origin_network_id = NetworkId::empty();
        self.start_device_id = -1;
        self.start_device_dhid = Dhid::default();
        self.flag = 0;
    }

    // ── Cursor ───────────────────────────────────────────────────────────────

    /// Moves the local pointer to a normalised position.
    pub fn set_cursor_position(&self, pos: NormalizedCoordinate) -> Result<(), InputError> {
        let display = self.input.default_display().ok_or(InputError::NoDisplay)?;
        self.input.set_pointer_location(display.denormalize(pos))
    }

    /// Tracks a local pointer event for hot areas, mouse location and the
    /// cursor position carried by the next handshake.
    pub fn on_pointer_event(&mut self, event: &InputPointerEvent) {
        let display = self.display();
        self.cursor_pos = display.normalize(event.position);
        self.hot_area.process_pointer(display, event.position);
        self.mouse_location
            .process_pointer(display, event.position, &self.dsoftbus);
    }

    /// Replaces the bits selected by `mask` with those of `flag`.
    pub fn update_cooperate_flag(&mut self, mask: u32, flag: u32) {
        self.flag = (self.flag & !mask) | (flag & mask);
    }

    // ── Observers ────────────────────────────────────────────────────────────

    pub fn add_observer(&mut self, observer: Arc<dyn CooperateObserver>) {
        if !self.observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            self.observers.push(observer);
        }
    }

    pub fn remove_observer(&mut self, observer: &Arc<dyn CooperateObserver>) {
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// `false` as soon as one observer vetoes.
    pub fn is_allow_cooperate(&self) -> bool {
        self.observers.iter().all(|o| o.is_allow_cooperate())
    }

    pub fn notify_observers(&self, f: impl Fn(&dyn CooperateObserver)) {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }

    // ── Timers and pending requests ──────────────────────────────────────────

    /// Arms a one-shot timer posting `PROTOCOL_TIMEOUT` for `step`.
    pub fn arm_timer(
        &self,
        step: ProtocolStep,
        network_id: &NetworkId,
        key: RequestKey,
    ) -> Result<TimerId, TimerError> {
        let interval = match step {
            ProtocolStep::Start => self.options.handshake_timeout_ms,
            ProtocolStep::Relay => self.options.relay_timeout_ms,
        };
        let sender = self.sender.clone();
        let network_id = network_id.clone();
        self.timers.add_timer(
            interval,
            1,
            Arc::new(move || {
                sender.send(CooperateEvent::ProtocolTimeout(ProtocolTimeoutEvent {
                    step,
                    network_id: network_id.clone(),
                    pid: key.pid,
                    user_data: key.user_data,
                }));
            }),
        )
    }

    pub fn reset_timer(&self, timer: TimerId) {
        if let Err(e) = self.timers.reset_timer(timer) {
            debug!("timer {timer} not reset: {e}");
        }
    }

    pub fn cancel_timer(&self, timer: TimerId) {
        if self.timers.is_exist(timer) {
            if let Err(e) = self.timers.remove_timer(timer) {
                debug!("timer {timer} not removed: {e}");
            }
        }
    }

    /// Parks `request` until the peer answers.  A request it displaces is
    /// answered with `Cancelled` and its timer disarmed.
    pub fn park_request(&mut self, request: PendingRequest) {
        if let Some(displaced) = self.pending.insert(request) {
            warn!(
                "request {} of {} replaced before it finished",
                displaced.user_data, displaced.pid
            );
            self.finish_request(displaced, Err(CooperateError::Cancelled));
        }
    }

    /// Disarms the request's timer and answers it.
    pub fn finish_request(&self, request: PendingRequest, result: Result<(), CooperateError>) {
        self.cancel_timer(request.timer);
        debug!(
            "request {} ({:?}) finished: {:?}",
            request.user_data, request.step, result
        );
        request.reply.respond(result);
    }

    /// Answers every parked request with `error`.
    pub fn cancel_all_pending(&mut self, error: CooperateError) {
        for request in self.pending.drain() {
            self.finish_request(request, Err(error.clone()));
        }
    }

    // ── Diagnostics ──────────────────────────────────────────────────────────

    pub fn dump(&self, out: &mut String) {
        let _ = writeln!(out, "  local: {}", self.local.anonymized());
        let _ = writeln!(out, "  peer: {}", self.remote_network_id.anonymized());
        let _ = writeln!(out, "  origin: {}", self.origin_network_id.anonymized());
        let _ = writeln!(
            out,
            "  start device: {} ({})",
            self.start_device_id, self.start_device_dhid
        );
        let _ = writeln!(
            out,
            "  cursor: ({}, {}) flag: {:#x}",
            self.cursor_pos.x, self.cursor_pos.y, self.flag
        );
        let _ = writeln!(out, "  pending requests: {}", self.pending.len());
        let _ = writeln!(out, "  remote devices: {}", self.remote_devices.total());
        self.event_mgr.dump(out);
        self.device_mgr.dump(out);
    }
}

#[cfg(test)]
mod tests {
    use coop_core::{Coordinate, InputDevice};

    use super::*;
    use crate::application::channel::channel;
    use crate::infrastructure::mock::MockCollaborators;

    fn mouse() -> InputDevice {
        InputDevice {
            id: 1,
            name: "USB Mouse".to_string(),
            phys: "usb-1".to_string(),
            is_pointer: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_enable_order_and_reverse_disable() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());

        // Act
        ctx.enable().expect("enable");
        ctx.disable();

        // Assert
        assert_eq!(
            mocks.journal(),
            vec![
                "devices.enable",
                "transport.enable",
                "boards.enable",
                "profiles.enable",
                "profiles.disable",
                "boards.disable",
                "transport.disable",
                "devices.disable",
            ]
        );
    }

    #[test]
    fn test_enable_rolls_back_when_transport_fails() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        mocks.transport.fail_enable(true);
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());

        // Act
        let result = ctx.enable();

        // Assert
        assert!(matches!(result, Err(CooperateError::Transport(_))));
        assert_eq!(mocks.journal(), vec!["devices.enable", "devices.disable"]);
    }

    #[test]
    fn test_start_cooperate_rejects_unknown_or_non_pointer_device() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
        ctx.enable().expect("enable");

        // Act
        let unknown = ctx.start_cooperate(&NetworkId::from("peer-b"), 42);
        let to_self = ctx.start_cooperate(&NetworkId::from("local"), 1);

        // Assert
        assert_eq!(unknown, Err(CooperateError::InvalidDevice(42)));
        assert_eq!(to_self, Err(CooperateError::InvalidNetworkId));
        assert!(ctx.peer().is_empty());
    }

    #[test]
    fn test_start_cooperate_binds_peer_and_dhid() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        mocks.devices.push(mouse());
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
        ctx.enable().expect("enable");

        // Act
        ctx.start_cooperate(&NetworkId::from("peer-b"), 1).expect("start");

        // Assert
        assert!(ctx.is_peer(&NetworkId::from("peer-b")));
        assert_eq!(ctx.origin(), &NetworkId::from("local"));
        assert_eq!(ctx.start_device_dhid(), &mouse().dhid());
    }

    #[test]
    fn test_remote_start_binds_origin_when_relayed() {
        // Arrange
        let mocks = MockCollaborators::new("peer-c");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());

        // Act
        ctx.remote_start(&DSoftbusStartCooperate {
            network_id: NetworkId::from("peer-b"),
            origin_network_id: NetworkId::from("peer-a"),
            success: true,
            ..Default::default()
        });

        // Assert
        assert_eq!(ctx.peer(), &NetworkId::from("peer-a"));
        assert_eq!(ctx.origin(), &NetworkId::from("peer-a"));
    }

    fn park(
        ctx: &mut Context,
        pid: i32,
        user_data: i32,
    ) -> (TimerId, crate::application::event::ReplyReceiver<()>) {
        let key = RequestKey { pid, user_data };
        let timer = ctx
            .arm_timer(ProtocolStep::Start, &NetworkId::from("peer-b"), key)
            .expect("timer");
        let (reply, rx) = crate::application::event::Responder::channel();
        ctx.park_request(PendingRequest {
            pid,
            user_data,
            network_id: NetworkId::from("peer-b"),
            step: ProtocolStep::Start,
            timer,
            reply,
        });
        (timer, rx)
    }

    #[test]
    fn test_callers_sharing_user_data_keep_their_own_replies() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());

        // Act
        let (_first_timer, mut first) = park(&mut ctx, 10, 3);
        let (_second_timer, mut second) = park(&mut ctx, 11, 3);
        let taken = ctx
            .pending
            .take(RequestKey { pid: 10, user_data: 3 })
            .expect("first request");
        ctx.finish_request(taken, Ok(()));

        // Assert
        assert_eq!(first.try_recv().expect("first reply"), Ok(()));
        assert!(second.try_recv().is_err());
        assert_eq!(ctx.pending.len(), 1);
        assert_eq!(mocks.timers.active().len(), 1);
    }

    #[test]
    fn test_displaced_request_is_cancelled_and_its_timer_disarmed() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
        let (first_timer, mut first) = park(&mut ctx, 10, 3);

        // Act
        let (second_timer, _second) = park(&mut ctx, 10, 3);

        // Assert
        assert_eq!(first.try_recv().expect("reply"), Err(CooperateError::Cancelled));
        assert_eq!(mocks.timers.active(), vec![second_timer]);
        assert_ne!(first_timer, second_timer);
    }

    #[test]
    fn test_update_cooperate_flag_replaces_masked_bits() {
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
        ctx.update_cooperate_flag(HIDE_CURSOR, HIDE_CURSOR | 0x4);
        assert_eq!(ctx.cooperate_flag(), HIDE_CURSOR);
        assert!(ctx.need_hide_cursor());
        ctx.update_cooperate_flag(HIDE_CURSOR, 0);
        assert!(!ctx.need_hide_cursor());
    }

    #[test]
    fn test_set_cursor_position_denormalizes_against_display() {
        // Arrange
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());

        // Act
        ctx.set_cursor_position(NormalizedCoordinate::new(50, 50))
            .expect("cursor");

        // Assert
        assert_eq!(
            mocks.input.pointer_locations.lock().unwrap().last(),
            Some(&Coordinate::new(960, 540))
        );
    }

    #[test]
    fn test_pointer_event_tracks_normalized_cursor() {
        let mocks = MockCollaborators::new("local");
        let (tx, _rx) = channel();
        let mut ctx = Context::new(tx, mocks.collaborators(), ContextOptions::default());
        ctx.on_pointer_event(&InputPointerEvent {
            position: Coordinate::new(1919, 539),
            ..Default::default()
        });
        assert_eq!(ctx.cursor_position(), NormalizedCoordinate::new(100, 50));
    }
}
