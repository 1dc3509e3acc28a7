//! The `CooperateEvent` sum type: every mutation that reaches the state machine.
//!
//! # Why one event enum? (for beginners)
//!
//! Many threads produce things that must change cooperation state: the IPC
//! service, the network transport, the input-device watcher and timers.  If
//! each of them called into the state machine directly, the state would need
//! locking everywhere and ordering between, say, a STOP from the network and a
//! new START from the user would be undefined.
//!
//! Instead every producer builds a `CooperateEvent` and pushes it onto a single
//! FIFO channel.  One worker thread pops events in order and hands them to the
//! state machine, so handlers run strictly one at a time and never lock.
//!
//! Requests that need an answer (`Start`, `Stop`, `GetCooperateState`, `Dump`)
//! carry a [`Responder`], the sending half of a one-shot channel the caller is
//! awaiting.

use std::fmt;
use std::sync::Arc;

use coop_core::protocol::messages::{
    DSoftbusComeBack, DSoftbusInputDevHotPlug, DSoftbusInputDevSync, DSoftbusRelayCooperate,
    DSoftbusRelayCooperateFinished, DSoftbusReplyMouseLocation, DSoftbusStartCooperate,
    DSoftbusStartCooperateFinished, DSoftbusStartCooperateResponse, DSoftbusStopCooperate,
    DSoftbusSubscribeMouseLocation, DSoftbusSyncMouseLocation, HotPlugChange,
};
use coop_core::{Coordinate, Dhid, InputDevice, NetworkId};
use tokio::sync::oneshot;
use tracing::debug;

use crate::application::collaborators::CooperateObserver;
use crate::application::error::CooperateError;

/// Source type of pointer events produced by a mouse.
pub const SOURCE_TYPE_MOUSE: i32 = 1;
/// Pointer action of a plain move.
pub const POINTER_ACTION_MOVE: i32 = 3;

/// System broadcast sent when the screen turns off.
pub const COMMON_EVENT_SCREEN_OFF: &str = "usual.event.SCREEN_OFF";
/// System broadcast sent when the screen gets locked.
pub const COMMON_EVENT_SCREEN_LOCKED: &str = "usual.event.SCREEN_LOCKED";

// ── Top-level state ──────────────────────────────────────────────────────────

/// The three top-level cooperation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooperateState {
    /// Nothing is shared.
    Free,
    /// Local input drives a peer.
    Out,
    /// A peer's input drives this device.
    In,
}

impl CooperateState {
    pub fn as_str(self) -> &'static str {
        match self {
            CooperateState::Free => "FREE",
            CooperateState::Out => "OUT",
            CooperateState::In => "IN",
        }
    }
}

impl fmt::Display for CooperateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Reply plumbing ───────────────────────────────────────────────────────────

/// One-shot reply handle carried by request events.
pub struct Responder<T> {
    tx: oneshot::Sender<Result<T, CooperateError>>,
}

/// Receiving half paired with a [`Responder`].
pub type ReplyReceiver<T> = oneshot::Receiver<Result<T, CooperateError>>;

impl<T> Responder<T> {
    /// Creates a responder and the receiver the caller awaits.
    pub fn channel() -> (Self, ReplyReceiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Sends the result.  A caller that already gave up is not an error.
    pub fn respond(self, result: Result<T, CooperateError>) {
        if self.tx.send(result).is_err() {
            debug!("reply dropped: requester no longer waiting");
        }
    }
}

impl<T> fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Responder")
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// A local request to move input to `remote_network_id`.
#[derive(Debug)]
pub struct StartCooperateEvent {
    pub pid: i32,
    pub user_data: i32,
    pub remote_network_id: NetworkId,
    pub start_device_id: i32,
    pub reply: Responder<()>,
}

/// A local request to end cooperation.
#[derive(Debug)]
pub struct StopCooperateEvent {
    pub pid: i32,
    pub user_data: i32,
    pub is_unchained: bool,
    pub reply: Responder<()>,
}

#[derive(Debug)]
pub struct GetCooperateStateEvent {
    pub pid: i32,
    pub user_data: i32,
    pub network_id: NetworkId,
    pub reply: Responder<bool>,
}

/// Kind of local device change reported by the device manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugKind {
    PlugKeyboard,
    UnplugPointer,
    UnplugKeyboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputHotplugEvent {
    pub kind: HotplugKind,
    pub device_id: i32,
    pub dhid: Dhid,
}

/// A local pointer event observed by the input monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputPointerEvent {
    pub device_id: i32,
    pub pointer_action: i32,
    pub source_type: i32,
    pub button: i32,
    /// Absolute position on the local display, in pixels.
    pub position: Coordinate,
    pub delta: Coordinate,
}

/// A local key event observed by the input interceptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputKeyEvent {
    pub device_id: i32,
    pub key_code: i32,
    pub key_action: i32,
}

/// Protocol step guarded by a handshake timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStep {
    Start,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTimeoutEvent {
    pub step: ProtocolStep,
    pub network_id: NetworkId,
    pub pid: i32,
    pub user_data: i32,
}

/// A device change on a peer, already applied to the remote registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHotplugEvent {
    pub network_id: NetworkId,
    pub change: HotPlugChange,
}

// ── The event ────────────────────────────────────────────────────────────────

/// Every structural transition of the cooperate subsystem.
pub enum CooperateEvent {
    // Worker control.
    Noop,
    Quit,

    // Observers and listeners.
    AddObserver(Arc<dyn CooperateObserver>),
    RemoveObserver(Arc<dyn CooperateObserver>),
    RegisterListener { pid: i32 },
    UnregisterListener { pid: i32 },
    RegisterHotAreaListener { pid: i32 },
    UnregisterHotAreaListener { pid: i32 },
    RegisterEventListener { pid: i32, network_id: NetworkId },
    UnregisterEventListener { pid: i32, network_id: NetworkId },

    // IPC requests.
    Enable { pid: i32, user_data: i32 },
    Disable { pid: i32, user_data: i32 },
    Start(StartCooperateEvent),
    Stop(StopCooperateEvent),
    GetCooperateState(GetCooperateStateEvent),
    Dump { reply: Responder<String> },

    // Application lifecycle.
    AppClosed { pid: i32 },
    /// A system broadcast such as [`COMMON_EVENT_SCREEN_OFF`].
    CommonEvent { name: String },

    // Board and switch state.
    DdmBoardOnline { network_id: NetworkId },
    DdmBoardOffline { network_id: NetworkId },
    DdpCooperateSwitchChanged { network_id: NetworkId, normal: bool },

    // Local input.
    InputDeviceAdded(InputDevice),
    InputDeviceRemoved { device_id: i32 },
    InputHotplug(InputHotplugEvent),
    InputPointerEvent(InputPointerEvent),
    UpdateCooperateFlag { mask: u32, flag: u32 },

    // Session lifecycle.
    DSoftbusSessionOpened { network_id: NetworkId },
    DSoftbusSessionClosed { network_id: NetworkId },

    // Cooperation handshake.
    DSoftbusStartCooperate(DSoftbusStartCooperate),
    DSoftbusStartCooperateResponse(DSoftbusStartCooperateResponse),
    DSoftbusStartCooperateFinished(DSoftbusStartCooperateFinished),
    DSoftbusStopCooperate(DSoftbusStopCooperate),
    DSoftbusComeBack(DSoftbusComeBack),
    DSoftbusRelayCooperate(DSoftbusRelayCooperate),
    DSoftbusRelayCooperateFinished(DSoftbusRelayCooperateFinished),

    // Remote devices.
    DSoftbusInputDevSync(DSoftbusInputDevSync),
    DSoftbusInputDevHotPlug(DSoftbusInputDevHotPlug),
    RemoteHotplug(RemoteHotplugEvent),

    // Mouse location.
    DSoftbusSubscribeMouseLocation(DSoftbusSubscribeMouseLocation),
    DSoftbusUnsubscribeMouseLocation(DSoftbusSubscribeMouseLocation),
    DSoftbusReplySubscribeMouseLocation(DSoftbusReplyMouseLocation),
    DSoftbusReplyUnsubscribeMouseLocation(DSoftbusReplyMouseLocation),
    DSoftbusMouseLocation(DSoftbusSyncMouseLocation),

    // Timers.
    ProtocolTimeout(ProtocolTimeoutEvent),
}

impl CooperateEvent {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CooperateEvent::Noop => "NOOP",
            CooperateEvent::Quit => "QUIT",
            CooperateEvent::AddObserver(_) => "ADD_OBSERVER",
            CooperateEvent::RemoveObserver(_) => "REMOVE_OBSERVER",
            CooperateEvent::RegisterListener { .. } => "REGISTER_LISTENER",
            CooperateEvent::UnregisterListener { .. } => "UNREGISTER_LISTENER",
            CooperateEvent::RegisterHotAreaListener { .. } => "REGISTER_HOTAREA_LISTENER",
            CooperateEvent::UnregisterHotAreaListener { .. } => "UNREGISTER_HOTAREA_LISTENER",
            CooperateEvent::RegisterEventListener { .. } => "REGISTER_EVENT_LISTENER",
            CooperateEvent::UnregisterEventListener { .. } => "UNREGISTER_EVENT_LISTENER",
            CooperateEvent::Enable { .. } => "ENABLE",
            CooperateEvent::Disable { .. } => "DISABLE",
            CooperateEvent::Start(_) => "START",
            CooperateEvent::Stop(_) => "STOP",
            CooperateEvent::GetCooperateState(_) => "GET_COOPERATE_STATE",
            CooperateEvent::Dump { .. } => "DUMP",
            CooperateEvent::AppClosed { .. } => "APP_CLOSED",
            CooperateEvent::CommonEvent { .. } => "COMMON_EVENT",
            CooperateEvent::DdmBoardOnline { .. } => "DDM_BOARD_ONLINE",
            CooperateEvent::DdmBoardOffline { .. } => "DDM_BOARD_OFFLINE",
            CooperateEvent::DdpCooperateSwitchChanged { .. } => "DDP_COOPERATE_SWITCH_CHANGED",
            CooperateEvent::InputDeviceAdded(_) => "INPUT_DEVICE_ADDED",
            CooperateEvent::InputDeviceRemoved { .. } => "INPUT_DEVICE_REMOVED",
            CooperateEvent::InputHotplug(_) => "INPUT_HOTPLUG_EVENT",
            CooperateEvent::InputPointerEvent(_) => "INPUT_POINTER_EVENT",
            CooperateEvent::UpdateCooperateFlag { .. } => "UPDATE_COOPERATE_FLAG",
            CooperateEvent::DSoftbusSessionOpened { .. } => "DSOFTBUS_SESSION_OPENED",
            CooperateEvent::DSoftbusSessionClosed { .. } => "DSOFTBUS_SESSION_CLOSED",
            CooperateEvent::DSoftbusStartCooperate(_) => "DSOFTBUS_START_COOPERATE",
            CooperateEvent::DSoftbusStartCooperateResponse(_) => "DSOFTBUS_START_COOPERATE_RESPONSE",
            CooperateEvent::DSoftbusStartCooperateFinished(_) => "DSOFTBUS_START_COOPERATE_FINISHED",
            CooperateEvent::DSoftbusStopCooperate(_) => "DSOFTBUS_STOP_COOPERATE",
            CooperateEvent::DSoftbusComeBack(_) => "DSOFTBUS_COME_BACK",
            CooperateEvent::DSoftbusRelayCooperate(_) => "DSOFTBUS_RELAY_COOPERATE",
            CooperateEvent::DSoftbusRelayCooperateFinished(_) => "DSOFTBUS_RELAY_COOPERATE_FINISHED",
            CooperateEvent::DSoftbusInputDevSync(_) => "DSOFTBUS_INPUT_DEV_SYNC",
            CooperateEvent::DSoftbusInputDevHotPlug(_) => "DSOFTBUS_INPUT_DEV_HOT_PLUG",
            CooperateEvent::RemoteHotplug(_) => "REMOTE_HOTPLUG_EVENT",
            CooperateEvent::DSoftbusSubscribeMouseLocation(_) => "DSOFTBUS_SUBSCRIBE_MOUSE_LOCATION",
            CooperateEvent::DSoftbusUnsubscribeMouseLocation(_) => {
                "DSOFTBUS_UNSUBSCRIBE_MOUSE_LOCATION"
            }
            CooperateEvent::DSoftbusReplySubscribeMouseLocation(_) => {
                "DSOFTBUS_REPLY_SUBSCRIBE_MOUSE_LOCATION"
            }
            CooperateEvent::DSoftbusReplyUnsubscribeMouseLocation(_) => {
                "DSOFTBUS_REPLY_UNSUBSCRIBE_MOUSE_LOCATION"
            }
            CooperateEvent::DSoftbusMouseLocation(_) => "DSOFTBUS_MOUSE_LOCATION",
            CooperateEvent::ProtocolTimeout(_) => "PROTOCOL_TIMEOUT",
        }
    }
}

impl fmt::Debug for CooperateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_can_be_awaited() {
        let (responder, rx) = Responder::<i32>::channel();
        responder.respond(Ok(5));
        let result = tokio_test::block_on(rx).expect("responder kept");
        assert_eq!(tokio_test::assert_ok!(result), 5);
    }

    #[test]
    fn test_responder_delivers_result_to_receiver() {
        // Arrange
        let (responder, mut rx) = Responder::<bool>::channel();

        // Act
        responder.respond(Ok(true));

        // Assert
        assert_eq!(rx.try_recv().expect("reply"), Ok(true));
    }

    #[test]
    fn test_responder_tolerates_dropped_receiver() {
        let (responder, rx) = Responder::<()>::channel();
        drop(rx);
        responder.respond(Err(CooperateError::Cancelled));
    }

    #[test]
    fn test_event_debug_uses_stable_name() {
        let ev = CooperateEvent::DdmBoardOffline {
            network_id: NetworkId::from("peer"),
        };
        assert_eq!(format!("{ev:?}"), "DDM_BOARD_OFFLINE");
        assert_eq!(CooperateState::Out.to_string(), "OUT");
    }
}
