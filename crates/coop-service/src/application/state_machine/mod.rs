//! The cooperate state machine.
//!
//! # How it is organised (for beginners)
//!
//! There are three top-level states, one struct each:
//!
//! | State  | Meaning                                  | Module          |
//! |--------|------------------------------------------|-----------------|
//! | `FREE` | nothing is shared                        | `free`          |
//! | `OUT`  | local keyboard and mouse drive a peer    | `cooperate_out` |
//! | `IN`   | a peer's keyboard and mouse drive us     | `cooperate_in`  |
//!
//! [`StateMachine::on_event`] first handles the events whose effect does not
//! depend on the state (listener registration, board bookkeeping, device
//! registries, mouse location).  Everything else is narrowed to a
//! [`StepEvent`] and passed to the current state, which matches it
//! exhaustively and may return the state to move to next.
//!
//! `IN` and `OUT` also have a sub-state (see `relay`): `Initial`, or
//! `RelayConfirmation` while waiting for the peer to acknowledge a relay.

mod cooperate_in;
mod cooperate_out;
mod free;
mod relay;

use std::fmt::Write as _;
use std::sync::Arc;

use coop_core::protocol::messages::{
    DSoftbusComeBack, DSoftbusRelayCooperate, DSoftbusRelayCooperateFinished,
    DSoftbusStartCooperate, DSoftbusStartCooperateFinished, DSoftbusStartCooperateResponse,
    DSoftbusStopCooperate, PeerMessage,
};
use coop_core::NetworkId;
use tracing::{debug, info, warn};

use crate::application::context::Context;
use crate::application::error::CooperateError;
use crate::application::event::{
    CooperateEvent, CooperateState, InputHotplugEvent, InputPointerEvent, ProtocolTimeoutEvent,
    RemoteHotplugEvent, Responder, StartCooperateEvent, StopCooperateEvent,
    COMMON_EVENT_SCREEN_LOCKED, COMMON_EVENT_SCREEN_OFF,
};
use crate::application::event_manager::EventInfo;

use cooperate_in::CooperateIn;
use cooperate_out::CooperateOut;
use free::CooperateFree;

/// Peer replies to a handshake step.
#[derive(Debug)]
pub(crate) enum ResponseEvent {
    StartResponse(DSoftbusStartCooperateResponse),
    StartFinished(DSoftbusStartCooperateFinished),
    RelayFinished(DSoftbusRelayCooperateFinished),
}

/// The events whose handling depends on the current state.
#[derive(Debug)]
pub(crate) enum StepEvent {
    Start(StartCooperateEvent),
    Stop(StopCooperateEvent),
    Disable,
    AppClosed { pid: i32 },
    BoardOffline { network_id: NetworkId },
    SwitchChanged { network_id: NetworkId, normal: bool },
    PointerEvent(InputPointerEvent),
    Hotplug(InputHotplugEvent),
    RemoteStart(DSoftbusStartCooperate),
    RemoteStop(DSoftbusStopCooperate),
    Response(ResponseEvent),
    Relay(DSoftbusRelayCooperate),
    ComeBack(DSoftbusComeBack),
    RemoteInputDevice { network_id: NetworkId },
    RemoteHotplug(RemoteHotplugEvent),
    UpdateCooperateFlag,
    SessionClosed { network_id: NetworkId },
    Timeout(ProtocolTimeoutEvent),
}

/// Behaviour shared by the three states.
pub(crate) trait CooperateStateHandler {
    fn on_event(&mut self, ctx: &mut Context, event: StepEvent) -> Option<CooperateState>;
    fn on_enter(&mut self, ctx: &mut Context);
    fn on_leave(&mut self, ctx: &mut Context);
    /// Drops any sub-state back to `Initial`.
    fn reset(&mut self, ctx: &mut Context);
    fn sub_state(&self) -> &'static str;
}

pub struct StateMachine {
    current: CooperateState,
    free: CooperateFree,
    cooperate_in: CooperateIn,
    cooperate_out: CooperateOut,
    online_boards: std::collections::BTreeSet<NetworkId>,
    monitor_id: Option<i32>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: CooperateState::Free,
            free: CooperateFree::new(),
            cooperate_in: CooperateIn::new(),
            cooperate_out: CooperateOut::new(),
            online_boards: std::collections::BTreeSet::new(),
            monitor_id: None,
        }
    }

    pub fn current(&self) -> CooperateState {
        self.current
    }

    /// Name of the current sub-state, for diagnostics.
    pub fn sub_state(&self) -> &'static str {
        match self.current {
            CooperateState::Free => self.free.sub_state(),
            CooperateState::In => self.cooperate_in.sub_state(),
            CooperateState::Out => self.cooperate_out.sub_state(),
        }
    }

    fn state_mut(&mut self, state: CooperateState) -> &mut dyn CooperateStateHandler {
        match state {
            CooperateState::Free => &mut self.free,
            CooperateState::In => &mut self.cooperate_in,
            CooperateState::Out => &mut self.cooperate_out,
        }
    }

    /// Moves to `state`: leave the current one, then enter the new one.
    /// Moving to the current state does nothing.
    pub fn transite_to(&mut self, ctx: &mut Context, state: CooperateState) {
        if state == self.current {
            return;
        }
        info!("transition {} -> {}", self.current, state);
        let previous = self.current;
        self.state_mut(previous).on_leave(ctx);
        self.current = state;
        self.state_mut(state).on_enter(ctx);
    }

    fn dispatch(&mut self, ctx: &mut Context, event: StepEvent) {
        let current = self.current;
        if let Some(next) = self.state_mut(current).on_event(ctx, event) {
            self.transite_to(ctx, next);
        }
    }

    /// Handles one event popped from the channel.
    pub fn on_event(&mut self, ctx: &mut Context, event: CooperateEvent) {
        debug!("{event:?} in {}/{}", self.current, self.sub_state());
        match event {
            CooperateEvent::Noop | CooperateEvent::Quit => {}

            CooperateEvent::AddObserver(observer) => ctx.add_observer(observer),
            CooperateEvent::RemoveObserver(observer) => ctx.remove_observer(&observer),

            CooperateEvent::RegisterListener { pid } => {
                ctx.event_mgr.add_listener(pid);
                ctx.processes().watch(pid, ctx.sender().clone());
            }
            CooperateEvent::UnregisterListener { pid } => ctx.event_mgr.remove_listener(pid),
            CooperateEvent::RegisterHotAreaListener { pid } => {
                ctx.hot_area.add_listener(pid);
                ctx.processes().watch(pid, ctx.sender().clone());
            }
            CooperateEvent::UnregisterHotAreaListener { pid } => ctx.hot_area.remove_listener(pid),
            CooperateEvent::RegisterEventListener { pid, network_id } => {
                ctx.mouse_location
                    .add_listener(pid, &network_id, &ctx.dsoftbus);
                ctx.processes().watch(pid, ctx.sender().clone());
            }
            CooperateEvent::UnregisterEventListener { pid, network_id } => {
                ctx.mouse_location
                    .remove_listener(pid, &network_id, &ctx.dsoftbus);
            }

            CooperateEvent::Enable { pid, user_data } => self.enable(ctx, pid, user_data),
            CooperateEvent::Disable { pid, user_data } => self.disable(ctx, pid, user_data),
            CooperateEvent::Start(ev) => {
                if !ctx.is_allow_cooperate() {
                    info!("start refused by an observer");
                    ev.reply.respond(Err(CooperateError::NotAllowed));
                    return;
                }
                self.dispatch(ctx, StepEvent::Start(ev));
            }
            CooperateEvent::Stop(ev) => self.dispatch(ctx, StepEvent::Stop(ev)),
            CooperateEvent::GetCooperateState(ev) => {
                ctx.event_mgr.get_cooperate_state(EventInfo {
                    pid: ev.pid,
                    user_data: ev.user_data,
                    network_id: ev.network_id.clone(),
                });
                let on = ctx.profiles().is_cooperate_switch_on(&ev.network_id);
                ev.reply.respond(Ok(on));
            }
            CooperateEvent::Dump { reply } => reply.respond(Ok(self.dump(ctx))),

            CooperateEvent::AppClosed { pid } => {
                ctx.event_mgr.on_client_died(pid);
                ctx.hot_area.on_client_died(pid);
                ctx.mouse_location.on_client_died(pid, &ctx.dsoftbus);
                ctx.processes().unwatch(pid);
                self.dispatch(ctx, StepEvent::AppClosed { pid });
            }
            CooperateEvent::CommonEvent { name } => self.on_common_event(ctx, &name),

            CooperateEvent::DdmBoardOnline { network_id } => {
                ctx.profiles().add_watch(&network_id);
                self.online_boards.insert(network_id);
            }
            CooperateEvent::DdmBoardOffline { network_id } => {
                if self.online_boards.remove(&network_id) {
                    ctx.profiles().remove_watch(&network_id);
                }
                self.dispatch(ctx, StepEvent::BoardOffline { network_id });
            }
            CooperateEvent::DdpCooperateSwitchChanged { network_id, normal } => {
                self.dispatch(ctx, StepEvent::SwitchChanged { network_id, normal });
            }

            CooperateEvent::InputDeviceAdded(device) => ctx.device_mgr.add_device(device),
            CooperateEvent::InputDeviceRemoved { device_id } => {
                ctx.device_mgr.remove_device(device_id)
            }
            CooperateEvent::InputHotplug(ev) => self.dispatch(ctx, StepEvent::Hotplug(ev)),
            CooperateEvent::InputPointerEvent(ev) => {
                ctx.on_pointer_event(&ev);
                self.dispatch(ctx, StepEvent::PointerEvent(ev));
            }
            CooperateEvent::UpdateCooperateFlag { mask, flag } => {
                ctx.update_cooperate_flag(mask, flag);
                self.dispatch(ctx, StepEvent::UpdateCooperateFlag);
            }

            CooperateEvent::DSoftbusSessionOpened { network_id } => {
                debug!("session with {} opened", network_id.anonymized());
            }
            CooperateEvent::DSoftbusSessionClosed { network_id } => {
                ctx.remote_devices.remove_peer(&network_id);
                ctx.mouse_location.on_session_closed(&network_id);
                if ctx.is_peer(&network_id) {
                    ctx.event_mgr.on_session_closed(&network_id);
                }
                self.dispatch(ctx, StepEvent::SessionClosed { network_id });
            }

            CooperateEvent::DSoftbusStartCooperate(ev) => {
                self.dispatch(ctx, StepEvent::RemoteStart(ev))
            }
            CooperateEvent::DSoftbusStartCooperateResponse(ev) => self.dispatch(
                ctx,
                StepEvent::Response(ResponseEvent::StartResponse(ev)),
            ),
            CooperateEvent::DSoftbusStartCooperateFinished(ev) => self.dispatch(
                ctx,
                StepEvent::Response(ResponseEvent::StartFinished(ev)),
            ),
            CooperateEvent::DSoftbusRelayCooperateFinished(ev) => self.dispatch(
                ctx,
                StepEvent::Response(ResponseEvent::RelayFinished(ev)),
            ),
            CooperateEvent::DSoftbusStopCooperate(ev) => {
                self.dispatch(ctx, StepEvent::RemoteStop(ev))
            }
            CooperateEvent::DSoftbusComeBack(ev) => self.dispatch(ctx, StepEvent::ComeBack(ev)),
            CooperateEvent::DSoftbusRelayCooperate(ev) => {
                self.dispatch(ctx, StepEvent::Relay(ev))
            }

            CooperateEvent::DSoftbusInputDevSync(ev) => {
                ctx.remote_devices.sync(&ev.network_id, ev.devices);
                self.dispatch(
                    ctx,
                    StepEvent::RemoteInputDevice {
                        network_id: ev.network_id,
                    },
                );
            }
            CooperateEvent::DSoftbusInputDevHotPlug(ev) => {
                if ctx.remote_devices.apply(&ev.network_id, &ev.change) {
                    ctx.sender().send(CooperateEvent::RemoteHotplug(RemoteHotplugEvent {
                        network_id: ev.network_id,
                        change: ev.change,
                    }));
                }
            }
            CooperateEvent::RemoteHotplug(ev) => self.dispatch(ctx, StepEvent::RemoteHotplug(ev)),

            CooperateEvent::DSoftbusSubscribeMouseLocation(ev) => {
                ctx.mouse_location.on_subscribe(&ev, &ctx.dsoftbus)
            }
            CooperateEvent::DSoftbusUnsubscribeMouseLocation(ev) => {
                ctx.mouse_location.on_unsubscribe(&ev, &ctx.dsoftbus)
            }
            CooperateEvent::DSoftbusReplySubscribeMouseLocation(ev) => {
                ctx.mouse_location.on_reply(&ev, true)
            }
            CooperateEvent::DSoftbusReplyUnsubscribeMouseLocation(ev) => {
                ctx.mouse_location.on_reply(&ev, false)
            }
            CooperateEvent::DSoftbusMouseLocation(ev) => ctx.mouse_location.on_remote_location(&ev),

            CooperateEvent::ProtocolTimeout(ev) => self.dispatch(ctx, StepEvent::Timeout(ev)),
        }
    }

    fn enable(&mut self, ctx: &mut Context, pid: i32, user_data: i32) {
        ctx.event_mgr.enable_cooperate(EventInfo {
            pid,
            user_data,
            network_id: ctx.local().clone(),
        });
        if let Err(e) = ctx.enable() {
            warn!("enabling cooperation failed: {e}");
            ctx.event_mgr.enable_cooperate_failed(e.code());
            return;
        }
        if self.monitor_id.is_none() {
            let sender = ctx.sender().clone();
            let monitor = Arc::new(move |ev: InputPointerEvent| {
                sender.send(CooperateEvent::InputPointerEvent(ev));
            });
            match ctx.input().add_monitor(monitor) {
                Ok(id) => self.monitor_id = Some(id),
                Err(e) => warn!("input monitor unavailable: {e}"),
            }
        }
    }

    fn disable(&mut self, ctx: &mut Context, pid: i32, user_data: i32) {
        debug!("disable requested by {pid} ({user_data})");
        self.dispatch(ctx, StepEvent::Disable);
        self.remove_monitor(ctx);
        self.remove_watches(ctx);
        ctx.disable();
    }

    /// Screen off or lock ends cooperation on behalf of the service itself.
    fn on_common_event(&mut self, ctx: &mut Context, name: &str) {
        if name != COMMON_EVENT_SCREEN_OFF && name != COMMON_EVENT_SCREEN_LOCKED {
            debug!("ignoring common event {name}");
            return;
        }
        info!("{name} received in {}", self.current);
        let (reply, _) = Responder::channel();
        self.dispatch(
            ctx,
            StepEvent::Stop(StopCooperateEvent {
                pid: std::process::id() as i32,
                user_data: 0,
                is_unchained: false,
                reply,
            }),
        );
    }

    fn remove_monitor(&mut self, ctx: &mut Context) {
        if let Some(id) = self.monitor_id.take() {
            ctx.input().remove_monitor(id);
        }
    }

    fn remove_watches(&mut self, ctx: &mut Context) {
        for network_id in std::mem::take(&mut self.online_boards) {
            ctx.profiles().remove_watch(&network_id);
        }
    }

    /// Last call on the worker: release OS handles, reset sub-states and
    /// cancel every parked request.
    pub fn on_quit(&mut self, ctx: &mut Context) {
        info!("cooperate worker quitting in {}", self.current);
        self.remove_watches(ctx);
        self.remove_monitor(ctx);
        let current = self.current;
        self.state_mut(current).on_leave(ctx);
        self.free.reset(ctx);
        self.cooperate_in.reset(ctx);
        self.cooperate_out.reset(ctx);
        ctx.cancel_all_pending(CooperateError::Cancelled);
    }

    pub fn dump(&self, ctx: &Context) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "cooperate state: {}/{}", self.current, self.sub_state());
        let _ = writeln!(out, "  online boards: {}", self.online_boards.len());
        ctx.dump(&mut out);
        out
    }
}

// ── Helpers shared by the states ─────────────────────────────────────────────

/// Sends a message to the peer, logging failures.
pub(crate) fn send_to(ctx: &Context, network_id: &NetworkId, msg: PeerMessage) -> bool {
    match ctx.dsoftbus.send(network_id, &msg) {
        Ok(()) => true,
        Err(e) => {
            warn!("sending {:?} to {} failed: {e}", msg.message_id(), network_id.anonymized());
            false
        }
    }
}

/// Tells the bound peer that cooperation ends.
pub(crate) fn send_stop(ctx: &Context) {
    let peer = ctx.peer().clone();
    send_to(
        ctx,
        &peer,
        PeerMessage::StopCooperate(DSoftbusStopCooperate {
            network_id: ctx.local().clone(),
            normal: true,
        }),
    );
}

/// Answers a local STOP while cooperating: notify the peer, report success.
pub(crate) fn stop_cooperate(ctx: &mut Context, ev: StopCooperateEvent) {
    let peer = ctx.peer().clone();
    ctx.event_mgr.stop_cooperate(EventInfo {
        pid: ev.pid,
        user_data: ev.user_data,
        network_id: peer.clone(),
    });
    send_stop(ctx);
    if ev.is_unchained {
        ctx.dsoftbus.close_session(&peer);
    }
    ctx.event_mgr.stop_cooperate_finish(&peer, true);
    ev.reply.respond(Ok(()));
}

/// Rejects a START from a device other than the one we are bound to.
pub(crate) fn reject_remote_start(ctx: &Context, ev: &DSoftbusStartCooperate) {
    info!("START from {} rejected while cooperating", ev.network_id.anonymized());
    send_to(
        ctx,
        &ev.network_id,
        PeerMessage::StartCooperateResponse(DSoftbusStartCooperateResponse {
            network_id: ctx.local().clone(),
            normal: false,
        }),
    );
}

/// `true` when `pid` issued the START behind the current cooperation.
pub(crate) fn is_start_caller(ctx: &Context, pid: i32) -> bool {
    ctx.event_mgr
        .last_call(crate::application::event_manager::CallKind::Start)
        .map_or(false, |call| call.pid == pid)
}
