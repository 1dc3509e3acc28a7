//! `OUT`: local keyboard and mouse drive the peer.
//!
//! While `OUT` the local pointer is hidden and an interceptor forwards local
//! pointer and key events to the peer.  The cooperation ends on a local STOP,
//! on the peer's STOP or COME_BACK, when another local mouse moves, or when
//! the start pointer is unplugged.  A START to a third device relays the
//! cooperation there.

use coop_core::protocol::messages::{
    DSoftbusInputDevHotPlug, DSoftbusInputDevSync, DSoftbusRelayCooperate,
    DSoftbusRelayCooperateFinished, DSoftbusStartCooperate, HotPlugChange, PeerMessage,
};
use coop_core::NetworkId;
use tracing::{debug, info, warn};

use crate::application::context::Context;
use crate::application::error::CooperateError;
use crate::application::event::{
    CooperateState, HotplugKind, InputHotplugEvent, InputPointerEvent, SOURCE_TYPE_MOUSE,
};
use crate::application::input_transmission::InputForwarder;

use super::relay::{self, RelayOutcome, RelayRequest, Step};
use super::{
    is_start_caller, reject_remote_start, send_stop, send_to, stop_cooperate,
    CooperateStateHandler, StepEvent,
};

#[derive(Default)]
pub(crate) struct CooperateOut {
    step: Step,
    forwarder: Option<InputForwarder>,
}

impl CooperateOut {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_forwarding(&mut self, ctx: &Context) {
        let forwarder = self
            .forwarder
            .get_or_insert_with(|| InputForwarder::new(ctx.input().clone()));
        if let Err(e) = forwarder.start(
            ctx.transport(),
            ctx.local().clone(),
            ctx.peer().clone(),
            ctx.start_device_id(),
        ) {
            warn!("input interception unavailable: {e}");
        }
    }

    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.stop();
        }
    }

    /// Sends the devices travelling with the start pointer to the peer.
    fn sync_devices(&self, ctx: &Context) {
        let devices = ctx
            .device_mgr
            .get_cooperate_devices(ctx.start_device_id(), ctx.local());
        let peer = ctx.peer().clone();
        send_to(
            ctx,
            &peer,
            PeerMessage::InputDevSync(DSoftbusInputDevSync {
                network_id: ctx.local().clone(),
                devices,
            }),
        );
    }

    /// Rebinds to `target` and moves forwarding and device sync with it.
    fn rebind(&mut self, ctx: &mut Context, target: &NetworkId) {
        ctx.relay_cooperate(target);
        self.start_forwarding(ctx);
        self.sync_devices(ctx);
        let cursor = ctx.cursor_position();
        ctx.notify_observers(|o| o.on_relay(target, cursor));
    }

    fn on_initial(&mut self, ctx: &mut Context, event: StepEvent) -> Option<CooperateState> {
        match event {
            StepEvent::Start(ev) => {
                let target = ev.remote_network_id.clone();
                if ctx.is_peer(&target) {
                    debug!("already cooperating with {}", target.anonymized());
                    ev.reply.respond(Ok(()));
                } else if target.is_empty() || ctx.is_local(&target) {
                    ev.reply.respond(Err(CooperateError::InvalidNetworkId));
                } else if let Some(request) = relay::begin_relay(ctx, ev) {
                    self.step = Step::RelayConfirmation(request);
                }
                None
            }
            StepEvent::Stop(ev) => {
                stop_cooperate(ctx, ev);
                Some(CooperateState::Free)
            }
            StepEvent::Disable => {
                send_stop(ctx);
                Some(CooperateState::Free)
            }
            StepEvent::AppClosed { pid } => {
                if !is_start_caller(ctx, pid) {
                    return None;
                }
                info!("start caller {pid} exited, stopping");
                send_stop(ctx);
                Some(CooperateState::Free)
            }
            StepEvent::RemoteStop(ev) => {
                if !ctx.is_peer(&ev.network_id) {
                    return None;
                }
                ctx.event_mgr.remote_stop(&ev.network_id);
                Some(CooperateState::Free)
            }
            StepEvent::BoardOffline { network_id } => {
                if !ctx.is_peer(&network_id) {
                    return None;
                }
                ctx.dsoftbus.close_session(&network_id);
                ctx.event_mgr.remote_stop(&network_id);
                Some(CooperateState::Free)
            }
            StepEvent::SessionClosed { network_id } => {
                ctx.is_peer(&network_id).then_some(CooperateState::Free)
            }
            StepEvent::SwitchChanged { network_id, normal } => {
                if normal || !ctx.is_peer(&network_id) {
                    return None;
                }
                send_stop(ctx);
                ctx.event_mgr.remote_stop(&network_id);
                Some(CooperateState::Free)
            }
            StepEvent::RemoteStart(ev) => {
                reject_remote_start(ctx, &ev);
                None
            }
            StepEvent::Relay(ev) => {
                self.on_relay(ctx, ev);
                None
            }
            StepEvent::ComeBack(ev) => {
                if !ctx.is_peer(&ev.network_id) || !ctx.is_local(&ev.origin_network_id) {
                    debug!("COME_BACK from {} ignored", ev.network_id.anonymized());
                    return None;
                }
                if let Err(e) = ctx.set_cursor_position(ev.cursor_pos) {
                    warn!("restoring the cursor failed: {e}");
                }
                let peer = ctx.peer().clone();
                ctx.notify_observers(|o| o.on_back(&peer, ev.cursor_pos));
                ctx.event_mgr.remote_stop(&peer);
                Some(CooperateState::Free)
            }
            StepEvent::PointerEvent(ev) => self.on_pointer(ctx, &ev),
            StepEvent::Hotplug(ev) => self.on_hotplug(ctx, &ev),
            StepEvent::Response(_)
            | StepEvent::RemoteInputDevice { .. }
            | StepEvent::RemoteHotplug(_)
            | StepEvent::UpdateCooperateFlag
            | StepEvent::Timeout(_) => None,
        }
    }

    /// The peer (in `IN`) hands the cooperation to a third device.
    fn on_relay(&mut self, ctx: &mut Context, ev: DSoftbusRelayCooperate) {
        if !ctx.is_peer(&ev.network_id) {
            debug!("RELAY from {} ignored", ev.network_id.anonymized());
            return;
        }
        let target = ev.target_network_id;
        let normal = !target.is_empty()
            && !ctx.is_local(&target)
            && match ctx.dsoftbus.open_session(&target) {
                Ok(()) => true,
                Err(e) => {
                    warn!("relay target unreachable: {e}");
                    false
                }
            };
        let peer = ctx.peer().clone();
        send_to(
            ctx,
            &peer,
            PeerMessage::RelayCooperateFinished(DSoftbusRelayCooperateFinished {
                network_id: ctx.local().clone(),
                normal,
                target_network_id: target.clone(),
            }),
        );
        if normal {
            self.rebind(ctx, &target);
        }
    }

    fn on_pointer(&mut self, ctx: &mut Context, ev: &InputPointerEvent) -> Option<CooperateState> {
        let other_mouse = ev.source_type == SOURCE_TYPE_MOUSE
            && ev.device_id != ctx.start_device_id()
            && ctx.device_mgr.is_local_pointer(ev.device_id);
        if !other_mouse {
            return None;
        }
        info!("local mouse {} moved, stopping", ev.device_id);
        send_stop(ctx);
        let peer = ctx.peer().clone();
        ctx.event_mgr.remote_stop(&peer);
        Some(CooperateState::Free)
    }

    fn on_hotplug(&mut self, ctx: &mut Context, ev: &InputHotplugEvent) -> Option<CooperateState> {
        let peer = ctx.peer().clone();
        let change = match ev.kind {
            HotplugKind::UnplugPointer if ev.device_id == ctx.start_device_id() => {
                info!("start pointer unplugged, stopping");
                send_stop(ctx);
                ctx.event_mgr.remote_stop(&peer);
                return Some(CooperateState::Free);
            }
            HotplugKind::UnplugPointer => return None,
            HotplugKind::PlugKeyboard => match ctx.device_mgr.get(ev.device_id) {
                Some(device) => HotPlugChange::Plug(device.clone()),
                None => return None,
            },
            HotplugKind::UnplugKeyboard => HotPlugChange::Unplug(ev.device_id),
        };
        send_to(
            ctx,
            &peer,
            PeerMessage::InputDevHotPlug(DSoftbusInputDevHotPlug {
                network_id: ctx.local().clone(),
                change,
            }),
        );
        None
    }

    /// The peer accepted our relay: start the target and rebind to it.
    fn complete_relay(&mut self, ctx: &mut Context, request: RelayRequest) -> Option<CooperateState> {
        let target = request.target.clone();
        let start = PeerMessage::StartCooperate(DSoftbusStartCooperate {
            network_id: ctx.local().clone(),
            origin_network_id: ctx.origin().clone(),
            success: true,
            cursor_pos: ctx.cursor_position(),
            start_device_dhid: ctx.start_device_dhid().clone(),
            flag: ctx.cooperate_flag(),
        });
        let had_session = ctx.dsoftbus.has_session(&target);
        let sent = ctx
            .dsoftbus
            .open_session(&target)
            .and_then(|()| ctx.dsoftbus.send(&target, &start));
        match sent {
            Ok(()) => {
                self.rebind(ctx, &target);
                relay::finish_relay(ctx, &request);
                None
            }
            Err(e) => {
                if !had_session {
                    ctx.dsoftbus.close_session(&target);
                }
                relay::abandon_relay(ctx, &request, e.into())
            }
        }
    }
}

impl CooperateStateHandler for CooperateOut {
    fn on_event(&mut self, ctx: &mut Context, event: StepEvent) -> Option<CooperateState> {
        let request = match &self.step {
            Step::Initial => return self.on_initial(ctx, event),
            Step::RelayConfirmation(request) => request.clone(),
        };
        match relay::on_relay_event(ctx, &request, event) {
            RelayOutcome::Stay => None,
            RelayOutcome::Failed => {
                self.step = Step::Initial;
                None
            }
            RelayOutcome::Completed(request) => {
                self.step = Step::Initial;
                self.complete_relay(ctx, request)
            }
            RelayOutcome::Cancelled(event) => {
                self.step = Step::Initial;
                self.on_initial(ctx, event)
            }
            RelayOutcome::Passthrough(event) => self.on_initial(ctx, event),
        }
    }

    fn on_enter(&mut self, ctx: &mut Context) {
        self.start_forwarding(ctx);
        if let Err(e) = ctx.input().set_pointer_visible(false) {
            warn!("hiding the pointer failed: {e}");
        }
        self.sync_devices(ctx);
        let peer = ctx.peer().clone();
        let cursor = ctx.cursor_position();
        ctx.notify_observers(|o| o.on_transition_out(&peer, cursor));
    }

    fn on_leave(&mut self, ctx: &mut Context) {
        self.reset(ctx);
        self.stop_forwarding();
    }

    fn reset(&mut self, ctx: &mut Context) {
        if let Step::RelayConfirmation(request) = std::mem::take(&mut self.step) {
            relay::fail_relay(ctx, &request, CooperateError::Cancelled);
        }
    }

    fn sub_state(&self) -> &'static str {
        self.step.name()
    }
}
