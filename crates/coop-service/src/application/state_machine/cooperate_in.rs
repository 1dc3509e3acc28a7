//! `IN`: the peer's keyboard and mouse drive this device.
//!
//! While `IN`, an [`InputEventBuilder`] observes the session and injects the
//! peer's pointer and key packets, and virtual devices mirror the peer's
//! devices.  A local START to the peer hands control back (`COME_BACK`); a
//! START to a third device relays the cooperation there.  Moving a local
//! mouse takes control back, unless the cursor is still hidden, in which case
//! the first move only reveals it.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use coop_core::protocol::messages::{
    DSoftbusComeBack, DSoftbusRelayCooperateFinished, DSoftbusStartCooperate, HotPlugChange,
    PeerMessage,
};
use coop_core::{InputDevice, NetworkId};
use tracing::{debug, info, warn};

use crate::application::collaborators::SessionObserver;
use crate::application::context::{Context, HIDE_CURSOR};
use crate::application::error::CooperateError;
use crate::application::event::{CooperateState, InputPointerEvent, SOURCE_TYPE_MOUSE};
use crate::application::event_manager::EventInfo;
use crate::application::input_transmission::InputEventBuilder;

use super::relay::{self, RelayOutcome, RelayRequest, Step};
use super::{
    is_start_caller, reject_remote_start, send_stop, send_to, stop_cooperate,
    CooperateStateHandler, StepEvent,
};

#[derive(Default)]
pub(crate) struct CooperateIn {
    step: Step,
    builder: Option<Arc<InputEventBuilder>>,
    /// Peer device id -> local virtual device id.
    virtual_devices: BTreeMap<i32, i32>,
}

fn as_observer(builder: &Arc<InputEventBuilder>) -> Weak<dyn SessionObserver> {
    let observer: Arc<dyn SessionObserver> = builder.clone();
    Arc::downgrade(&observer)
}

impl CooperateIn {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_cursor_visibility(&self, ctx: &Context) {
        let visible = !ctx.need_hide_cursor();
        if let Err(e) = ctx.input().set_pointer_visible(visible) {
            warn!("pointer visibility change failed: {e}");
        }
    }

    fn add_virtual_device(&mut self, ctx: &Context, device: &InputDevice) {
        if self.virtual_devices.contains_key(&device.id) {
            return;
        }
        match ctx.input().add_virtual_device(device) {
            Ok(local_id) => {
                debug!("virtual device {local_id} mirrors remote {}", device.id);
                self.virtual_devices.insert(device.id, local_id);
            }
            Err(e) => warn!("creating virtual device for remote {} failed: {e}", device.id),
        }
    }

    fn remove_virtual_device(&mut self, ctx: &Context, remote_id: i32) {
        if let Some(local_id) = self.virtual_devices.remove(&remote_id) {
            ctx.input().remove_virtual_device(local_id);
        }
    }

    /// Makes the virtual devices match the peer's reported list.
    fn sync_virtual_devices(&mut self, ctx: &Context) {
        let wanted = ctx.remote_devices.devices_of(ctx.peer());
        let stale: Vec<i32> = self
            .virtual_devices
            .keys()
            .filter(|id| !wanted.iter().any(|dev| dev.id == **id))
            .copied()
            .collect();
        for remote_id in stale {
            self.remove_virtual_device(ctx, remote_id);
        }
        for device in &wanted {
            self.add_virtual_device(ctx, device);
        }
    }

    fn clear_virtual_devices(&mut self, ctx: &Context) {
        for (_, local_id) in std::mem::take(&mut self.virtual_devices) {
            ctx.input().remove_virtual_device(local_id);
        }
    }

    fn on_initial(&mut self, ctx: &mut Context, event: StepEvent) -> Option<CooperateState> {
        match event {
            StepEvent::Start(ev) => {
                let target = ev.remote_network_id.clone();
                if target.is_empty() || ctx.is_local(&target) {
                    ev.reply.respond(Err(CooperateError::InvalidNetworkId));
                    return None;
                }
                if ctx.is_peer(&target) {
                    ctx.event_mgr.start_cooperate(EventInfo {
                        pid: ev.pid,
                        user_data: ev.user_data,
                        network_id: target.clone(),
                    });
                    let result = self.come_back(ctx);
                    ctx.event_mgr
                        .start_cooperate_finish(&target, result.as_ref().err().map(CooperateError::code));
                    let next = result.is_ok().then_some(CooperateState::Free);
                    ev.reply.respond(result);
                    return next;
                }
                let had_session = ctx.dsoftbus.has_session(&target);
                if let Err(e) = ctx.dsoftbus.open_session(&target) {
                    ev.reply.respond(Err(e.into()));
                    return None;
                }
                match relay::begin_relay(ctx, ev) {
                    Some(request) => self.step = Step::RelayConfirmation(request),
                    None if !had_session => ctx.dsoftbus.close_session(&target),
                    None => {}
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
                if !ctx.is_peer(&ev.network_id) {
                    return None;
                }
                info!("{} moves on to {}", ev.network_id.anonymized(), ev.target_network_id.anonymized());
                send_to(
                    ctx,
                    &ev.network_id,
                    PeerMessage::RelayCooperateFinished(DSoftbusRelayCooperateFinished {
                        network_id: ctx.local().clone(),
                        normal: true,
                        target_network_id: ev.target_network_id,
                    }),
                );
                ctx.event_mgr.remote_stop(&ev.network_id);
                Some(CooperateState::Free)
            }
            StepEvent::ComeBack(ev) => {
                let expected = ctx.is_peer(&ev.network_id) && ev.origin_network_id == *ctx.origin();
                expected.then_some(CooperateState::Free)
            }
            StepEvent::PointerEvent(ev) => self.on_pointer(ctx, &ev),
            StepEvent::RemoteInputDevice { network_id } => {
                if ctx.is_peer(&network_id) {
                    self.sync_virtual_devices(ctx);
                }
                None
            }
            StepEvent::RemoteHotplug(ev) => {
                if ctx.is_peer(&ev.network_id) {
                    match &ev.change {
                        HotPlugChange::Plug(device) => self.add_virtual_device(ctx, device),
                        HotPlugChange::Unplug(remote_id) => self.remove_virtual_device(ctx, *remote_id),
                    }
                }
                None
            }
            StepEvent::UpdateCooperateFlag => {
                self.apply_cursor_visibility(ctx);
                None
            }
            StepEvent::Hotplug(_) | StepEvent::Response(_) | StepEvent::Timeout(_) => None,
        }
    }

    /// Hands control back to the peer with the current cursor position.
    fn come_back(&mut self, ctx: &Context) -> Result<(), CooperateError> {
        let peer = ctx.peer().clone();
        let msg = PeerMessage::ComeBack(DSoftbusComeBack {
            network_id: ctx.local().clone(),
            origin_network_id: ctx.origin().clone(),
            success: true,
            cursor_pos: ctx.cursor_position(),
        });
        ctx.dsoftbus.send(&peer, &msg)?;
        let cursor = ctx.cursor_position();
        ctx.notify_observers(|o| o.on_back(&peer, cursor));
        Ok(())
    }

    fn on_pointer(&mut self, ctx: &mut Context, ev: &InputPointerEvent) -> Option<CooperateState> {
        if ev.source_type != SOURCE_TYPE_MOUSE || !ctx.device_mgr.is_local_pointer(ev.device_id) {
            return None;
        }
        if ctx.need_hide_cursor() {
            ctx.update_cooperate_flag(HIDE_CURSOR, 0);
            self.apply_cursor_visibility(ctx);
            return None;
        }
        info!("local mouse {} moved, taking control back", ev.device_id);
        send_stop(ctx);
        let peer = ctx.peer().clone();
        ctx.event_mgr.remote_stop(&peer);
        Some(CooperateState::Free)
    }

    /// The peer accepted our relay: start the target on the origin's behalf.
    fn complete_relay(&mut self, ctx: &mut Context, request: RelayRequest) -> Option<CooperateState> {
        let origin = if ctx.origin().is_empty() {
            ctx.peer().clone()
        } else {
            ctx.origin().clone()
        };
        let start = PeerMessage::StartCooperate(DSoftbusStartCooperate {
            network_id: ctx.local().clone(),
            origin_network_id: origin,
            success: true,
            cursor_pos: ctx.cursor_position(),
            start_device_dhid: ctx.start_device_dhid().clone(),
            flag: ctx.cooperate_flag(),
        });
        match ctx.dsoftbus.send(&request.target, &start) {
            Ok(()) => {
                relay::finish_relay(ctx, &request);
                Some(CooperateState::Free)
            }
            Err(e) => {
                ctx.dsoftbus.close_session(&request.target);
                relay::abandon_relay(ctx, &request, e.into())
            }
        }
    }
}

impl CooperateStateHandler for CooperateIn {
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
        let builder = Arc::new(InputEventBuilder::new(ctx.input().clone()));
        builder.enable(ctx.peer());
        ctx.dsoftbus.add_observer(as_observer(&builder));
        self.builder = Some(builder);

        if !ctx.need_hide_cursor() {
            if let Err(e) = ctx.set_cursor_position(ctx.cursor_position()) {
                warn!("placing the cursor failed: {e}");
            }
        }
        self.apply_cursor_visibility(ctx);
        self.sync_virtual_devices(ctx);

        let peer: NetworkId = ctx.peer().clone();
        let cursor = ctx.cursor_position();
        ctx.notify_observers(|o| o.on_transition_in(&peer, cursor));
    }

    fn on_leave(&mut self, ctx: &mut Context) {
        self.reset(ctx);
        if let Some(builder) = self.builder.take() {
            builder.disable();
            ctx.dsoftbus.remove_observer(&as_observer(&builder));
        }
        self.clear_virtual_devices(ctx);
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
