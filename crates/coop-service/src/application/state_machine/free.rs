//! `FREE`: nothing is shared.
//!
//! A local START opens a session to the target, sends
//! `DSOFTBUS_START_COOPERATE` and parks the request behind the handshake
//! timer.  The peer's `RESPONSE` re-arms the timer (or refuses), its
//! `FINISHED` completes the handshake and moves us to `OUT`.
//!
//! A remote START is accepted unless a local handshake is in flight or an
//! observer vetoes; accepting answers `RESPONSE` then `FINISHED` and moves us
//! to `IN`.

use coop_core::protocol::messages::{
    DSoftbusStartCooperate, DSoftbusStartCooperateFinished, DSoftbusStartCooperateResponse,
    PeerMessage,
};
use tracing::{debug, info, warn};

use crate::application::collaborators::TimerId;
use crate::application::context::Context;
use crate::application::error::CooperateError;
use crate::application::event::{
    CooperateState, ProtocolStep, StartCooperateEvent, StopCooperateEvent,
};
use crate::application::event_manager::EventInfo;
use crate::application::pending::{PendingRequest, RequestKey};

use super::{reject_remote_start, send_stop, send_to, CooperateStateHandler, ResponseEvent, StepEvent};

#[derive(Debug, Default)]
pub(crate) struct CooperateFree;

impl CooperateFree {
    pub fn new() -> Self {
        Self
    }

    fn start(&mut self, ctx: &mut Context, ev: StartCooperateEvent) {
        if ctx.pending.has_step(ProtocolStep::Start) {
            ev.reply.respond(Err(CooperateError::Busy));
            return;
        }
        let target = ev.remote_network_id.clone();
        ctx.event_mgr.start_cooperate(EventInfo {
            pid: ev.pid,
            user_data: ev.user_data,
            network_id: target.clone(),
        });
        match initiate(ctx, &ev) {
            Ok(timer) => {
                info!("START sent to {}", target.anonymized());
                ctx.park_request(PendingRequest {
                    pid: ev.pid,
                    user_data: ev.user_data,
                    network_id: target,
                    step: ProtocolStep::Start,
                    timer,
                    reply: ev.reply,
                });
            }
            Err(e) => {
                warn!("start to {} failed: {e}", target.anonymized());
                ctx.event_mgr.start_cooperate_finish(&target, Some(e.code()));
                ctx.reset_cooperation();
                ev.reply.respond(Err(e));
            }
        }
    }

    fn stop(&mut self, ctx: &mut Context, ev: StopCooperateEvent) {
        let peer = ctx.peer().clone();
        ctx.event_mgr.stop_cooperate(EventInfo {
            pid: ev.pid,
            user_data: ev.user_data,
            network_id: peer.clone(),
        });
        if ctx.pending.has_step(ProtocolStep::Start) {
            send_stop(ctx);
            fail_start(ctx, CooperateError::Cancelled);
        }
        ctx.event_mgr.stop_cooperate_finish(&peer, true);
        ev.reply.respond(Ok(()));
    }

    fn remote_start(&mut self, ctx: &mut Context, ev: DSoftbusStartCooperate) -> Option<CooperateState> {
        if ctx.pending.has_step(ProtocolStep::Start) || !ctx.is_allow_cooperate() {
            reject_remote_start(ctx, &ev);
            return None;
        }
        ctx.remote_start(&ev);
        let peer = ctx.peer().clone();
        let opened = ctx
            .dsoftbus
            .open_session(&ev.network_id)
            .and_then(|()| ctx.dsoftbus.open_session(&peer));
        if let Err(e) = opened {
            warn!("cannot answer START from {}: {e}", ev.network_id.anonymized());
            ctx.reset_cooperation();
            return None;
        }
        ctx.event_mgr.remote_start(&peer);
        let local = ctx.local().clone();
        let responded = send_to(
            ctx,
            &ev.network_id,
            PeerMessage::StartCooperateResponse(DSoftbusStartCooperateResponse {
                network_id: local.clone(),
                normal: true,
            }),
        ) && send_to(
            ctx,
            &ev.network_id,
            PeerMessage::StartCooperateFinished(DSoftbusStartCooperateFinished {
                network_id: local,
                origin_network_id: ctx.origin().clone(),
                success: true,
                start_device_dhid: ev.start_device_dhid.clone(),
                cursor_pos: ev.cursor_pos,
                flag: ev.flag,
            }),
        );
        ctx.event_mgr.remote_start_finish(&peer, responded);
        if !responded {
            ctx.reset_cooperation();
            return None;
        }
        Some(CooperateState::In)
    }

    fn on_response(&mut self, ctx: &mut Context, ev: ResponseEvent) -> Option<CooperateState> {
        match ev {
            ResponseEvent::StartResponse(resp) => {
                let Some(timer) = pending_start_timer(ctx) else {
                    return None;
                };
                if !ctx.is_peer(&resp.network_id) {
                    debug!("RESPONSE from {} ignored", resp.network_id.anonymized());
                } else if resp.normal {
                    ctx.reset_timer(timer);
                } else {
                    fail_start(ctx, CooperateError::Rejected);
                }
                None
            }
            ResponseEvent::StartFinished(fin) => {
                if !ctx.is_peer(&fin.network_id) || !ctx.pending.has_step(ProtocolStep::Start) {
                    debug!("stale FINISHED from {} ignored", fin.network_id.anonymized());
                    return None;
                }
                if !fin.success {
                    fail_start(ctx, CooperateError::Rejected);
                    return None;
                }
                ctx.remote_start_success(&fin);
                if let Some(request) = ctx.pending.take_step(ProtocolStep::Start) {
                    ctx.event_mgr.start_cooperate_finish(&request.network_id, None);
                    ctx.finish_request(request, Ok(()));
                }
                Some(CooperateState::Out)
            }
            ResponseEvent::RelayFinished(fin) => {
                debug!("RELAY_FINISHED from {} ignored", fin.network_id.anonymized());
                None
            }
        }
    }
}

/// Validates and binds the start, opens the session, sends START and arms
/// the handshake timer.
fn initiate(ctx: &mut Context, ev: &StartCooperateEvent) -> Result<TimerId, CooperateError> {
    ctx.start_cooperate(&ev.remote_network_id, ev.start_device_id)?;
    let target = ev.remote_network_id.clone();
    ctx.dsoftbus.open_session(&target)?;
    let start = PeerMessage::StartCooperate(DSoftbusStartCooperate {
        network_id: ctx.local().clone(),
        origin_network_id: ctx.origin().clone(),
        success: true,
        cursor_pos: ctx.cursor_position(),
        start_device_dhid: ctx.start_device_dhid().clone(),
        flag: ctx.cooperate_flag(),
    });
    ctx.dsoftbus.send(&target, &start)?;
    let key = RequestKey {
        pid: ev.pid,
        user_data: ev.user_data,
    };
    Ok(ctx.arm_timer(ProtocolStep::Start, &target, key)?)
}

fn pending_start_timer(ctx: &Context) -> Option<TimerId> {
    ctx.pending
        .find_step(ProtocolStep::Start)
        .map(|request| request.timer)
}

/// Fails the in-flight start and forgets the peer.
fn fail_start(ctx: &mut Context, error: CooperateError) {
    if let Some(request) = ctx.pending.take_step(ProtocolStep::Start) {
        info!("start to {} failed: {error}", request.network_id.anonymized());
        ctx.event_mgr
            .start_cooperate_finish(&request.network_id, Some(error.code()));
        ctx.finish_request(request, Err(error));
    }
    ctx.reset_cooperation();
}

impl CooperateStateHandler for CooperateFree {
    fn on_event(&mut self, ctx: &mut Context, event: StepEvent) -> Option<CooperateState> {
        let negotiating = ctx.pending.has_step(ProtocolStep::Start);
        match event {
            StepEvent::Start(ev) => {
                self.start(ctx, ev);
                None
            }
            StepEvent::Stop(ev) => {
                self.stop(ctx, ev);
                None
            }
            StepEvent::Disable => {
                if negotiating {
                    send_stop(ctx);
                    fail_start(ctx, CooperateError::Cancelled);
                }
                None
            }
            StepEvent::AppClosed { pid } => {
                let caller = ctx
                    .pending
                    .find_step(ProtocolStep::Start)
                    .map_or(false, |request| request.pid == pid);
                if caller {
                    send_stop(ctx);
                    fail_start(ctx, CooperateError::Cancelled);
                }
                None
            }
            StepEvent::BoardOffline { network_id } => {
                if negotiating && ctx.is_peer(&network_id) {
                    ctx.dsoftbus.close_session(&network_id);
                    fail_start(ctx, CooperateError::Cancelled);
                }
                None
            }
            StepEvent::SessionClosed { network_id } => {
                if negotiating && ctx.is_peer(&network_id) {
                    fail_start(ctx, CooperateError::Cancelled);
                }
                None
            }
            StepEvent::SwitchChanged { network_id, normal } => {
                if negotiating && !normal && ctx.is_peer(&network_id) {
                    fail_start(ctx, CooperateError::NotAllowed);
                }
                None
            }
            StepEvent::RemoteStop(ev) => {
                if negotiating && ctx.is_peer(&ev.network_id) {
                    fail_start(ctx, CooperateError::Rejected);
                }
                None
            }
            StepEvent::Timeout(ev) => {
                let expected = ctx
                    .pending
                    .find_step(ProtocolStep::Start)
                    .map_or(false, |request| {
                        request.key()
                            == RequestKey {
                                pid: ev.pid,
                                user_data: ev.user_data,
                            }
                    });
                if ev.step == ProtocolStep::Start && expected {
                    warn!("START to {} timed out", ev.network_id.anonymized());
                    fail_start(ctx, CooperateError::Timeout);
                }
                None
            }
            StepEvent::RemoteStart(ev) => self.remote_start(ctx, ev),
            StepEvent::Response(ev) => self.on_response(ctx, ev),
            StepEvent::PointerEvent(_)
            | StepEvent::Hotplug(_)
            | StepEvent::Relay(_)
            | StepEvent::ComeBack(_)
            | StepEvent::RemoteInputDevice { .. }
            | StepEvent::RemoteHotplug(_)
            | StepEvent::UpdateCooperateFlag => None,
        }
    }

    fn on_enter(&mut self, ctx: &mut Context) {
        ctx.reset_cooperation();
        ctx.notify_observers(|o| o.on_reset());
        if let Err(e) = ctx.input().set_pointer_visible(true) {
            warn!("showing the pointer failed: {e}");
        }
    }

    fn on_leave(&mut self, _ctx: &mut Context) {}

    fn reset(&mut self, _ctx: &mut Context) {}

    fn sub_state(&self) -> &'static str {
        "Initial"
    }
}
