//! Narrow interfaces to everything the cooperate core does not own.
//!
//! The state machine never talks to the OS, the network or the IPC layer
//! directly.  Each outside concern is a trait here; infrastructure provides the
//! real implementations and tests provide recording doubles.
//!
//! | Trait              | Concern                                              |
//! |--------------------|------------------------------------------------------|
//! | `InputAdapter`     | monitor/intercept local input, inject remote input   |
//! | `DeviceSource`     | enumerate local input devices and watch hot-plug     |
//! | `SessionTransport` | one bidirectional session per peer (DSoftbus)        |
//! | `BoardManager`     | board online/offline (DDM)                           |
//! | `DeviceProfile`    | the per-peer cooperate switch (DDP)                  |
//! | `ProcessMonitor`   | death of registered client processes                 |
//! | `ClientNotifier`   | notifications back to client processes               |
//! | `TimerService`     | one-shot and repeating timers                        |
//!
//! Collaborators that call back (device source, boards, profiles, processes,
//! timers) only ever post a [`CooperateEvent`](crate::application::event::CooperateEvent)
//! through the [`EventSender`] they were given.

use std::sync::{Arc, Weak};

use coop_core::protocol::messages::{DSoftbusKeyEvent, DSoftbusPointerEvent, LocationInfo};
use coop_core::{Coordinate, DisplayInfo, InputDevice, NetPacket, NetworkId, NormalizedCoordinate};

use crate::application::channel::EventSender;
use crate::application::error::{CooperateError, InputError, TimerError, TransportError};
use crate::application::event::{InputKeyEvent, InputPointerEvent};
use crate::application::event_manager::CoordinationMessage;
use crate::application::hot_area::HotAreaType;

// ── Input ────────────────────────────────────────────────────────────────────

/// Callback receiving every local pointer event (monitor).
pub type PointerCallback = Arc<dyn Fn(InputPointerEvent) + Send + Sync>;

/// A local event captured by an interceptor.  Intercepted events are consumed
/// and never reach local applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptedInput {
    Pointer(InputPointerEvent),
    Key(InputKeyEvent),
}

pub type InterceptCallback = Arc<dyn Fn(InterceptedInput) + Send + Sync>;

/// Local input pipeline: observation, interception, pointer control and
/// injection of remote events.
pub trait InputAdapter: Send + Sync {
    /// Observes local pointer events without consuming them.
    fn add_monitor(&self, callback: PointerCallback) -> Result<i32, InputError>;
    fn remove_monitor(&self, monitor_id: i32);

    /// Consumes local pointer and key events.
    fn add_interceptor(&self, callback: InterceptCallback) -> Result<i32, InputError>;
    fn remove_interceptor(&self, interceptor_id: i32);

    fn set_pointer_visible(&self, visible: bool) -> Result<(), InputError>;
    fn set_pointer_location(&self, pos: Coordinate) -> Result<(), InputError>;
    fn default_display(&self) -> Option<DisplayInfo>;

    /// Creates a virtual device mirroring a peer's device; returns its id.
    fn add_virtual_device(&self, device: &InputDevice) -> Result<i32, InputError>;
    fn remove_virtual_device(&self, device_id: i32);

    fn simulate_pointer_event(&self, event: &DSoftbusPointerEvent) -> Result<(), InputError>;
    fn simulate_key_event(&self, event: &DSoftbusKeyEvent) -> Result<(), InputError>;
}

/// Enumerates local input devices.
pub trait DeviceSource: Send + Sync {
    /// Starts watching.  Returns the devices attached right now; later changes
    /// are posted as `InputDeviceAdded`/`InputDeviceRemoved`.
    fn enable(&self, sender: EventSender) -> Result<Vec<InputDevice>, InputError>;
    fn disable(&self);
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Receives session callbacks.  Called on the transport's own threads.
pub trait SessionObserver: Send + Sync {
    fn on_bind(&self, network_id: &NetworkId);
    fn on_shutdown(&self, network_id: &NetworkId);
    /// Returns `true` when the packet was consumed and must not be offered to
    /// later observers.
    fn on_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> bool;
}

/// One bidirectional session per peer.
pub trait SessionTransport: Send + Sync {
    /// Starts the listening endpoint.
    fn enable(&self) -> Result<(), TransportError>;
    /// Closes every session, then the listener.
    fn disable(&self);
    /// Opens a session.  A second call for a connected peer is a no-op success.
    fn open_session(&self, network_id: &NetworkId) -> Result<(), TransportError>;
    fn close_session(&self, network_id: &NetworkId);
    fn has_session(&self, network_id: &NetworkId) -> bool;
    fn send_packet(&self, network_id: &NetworkId, packet: &NetPacket) -> Result<(), TransportError>;
    fn local_network_id(&self) -> NetworkId;
    fn add_observer(&self, observer: Weak<dyn SessionObserver>);
    fn remove_observer(&self, observer: &Weak<dyn SessionObserver>);
}

// ── Boards and profiles ──────────────────────────────────────────────────────

/// Distributed device management: posts `DdmBoardOnline`/`DdmBoardOffline`.
pub trait BoardManager: Send + Sync {
    fn enable(&self, sender: EventSender) -> Result<(), CooperateError>;
    fn disable(&self);
}

/// Device profile store holding each device's cooperate switch.
pub trait DeviceProfile: Send + Sync {
    /// Starts posting `DdpCooperateSwitchChanged` for watched peers.
    fn enable(&self, sender: EventSender) -> Result<(), CooperateError>;
    fn disable(&self);
    fn is_cooperate_switch_on(&self, network_id: &NetworkId) -> bool;
    fn add_watch(&self, network_id: &NetworkId);
    fn remove_watch(&self, network_id: &NetworkId);
}

// ── Clients ──────────────────────────────────────────────────────────────────

/// Posts `AppClosed { pid }` when a watched process dies.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessMonitor: Send + Sync {
    fn watch(&self, pid: i32, sender: EventSender);
    fn unwatch(&self, pid: i32);
}

/// Delivers notifications to client processes.
pub trait ClientNotifier: Send + Sync {
    fn notify_coordination_message(
        &self,
        pid: i32,
        user_data: i32,
        network_id: &NetworkId,
        msg: CoordinationMessage,
        err_code: i32,
    );
    fn notify_hot_area(&self, pid: i32, area: HotAreaType, is_edge: bool);
    fn notify_mouse_location(&self, pid: i32, network_id: &NetworkId, location: LocationInfo);
}

/// Observer of cooperation transitions, with a veto over new sessions.
pub trait CooperateObserver: Send + Sync {
    fn is_allow_cooperate(&self) -> bool {
        true
    }
    fn on_transition_out(&self, _remote: &NetworkId, _cursor: NormalizedCoordinate) {}
    fn on_transition_in(&self, _remote: &NetworkId, _cursor: NormalizedCoordinate) {}
    fn on_back(&self, _remote: &NetworkId, _cursor: NormalizedCoordinate) {}
    fn on_relay(&self, _remote: &NetworkId, _cursor: NormalizedCoordinate) {}
    fn on_reset(&self) {}
}

// ── Timers ───────────────────────────────────────────────────────────────────

pub type TimerId = i32;
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Timer service.  Callbacks must only post events.
pub trait TimerService: Send + Sync {
    /// Schedules `callback` every `interval_ms`, `repeat` times (`<= 0` means
    /// forever).
    fn add_timer(
        &self,
        interval_ms: u64,
        repeat: i32,
        callback: TimerCallback,
    ) -> Result<TimerId, TimerError>;
    fn remove_timer(&self, timer_id: TimerId) -> Result<(), TimerError>;
    /// Restarts the countdown of a live timer.
    fn reset_timer(&self, timer_id: TimerId) -> Result<(), TimerError>;
    fn is_exist(&self, timer_id: TimerId) -> bool;
}
