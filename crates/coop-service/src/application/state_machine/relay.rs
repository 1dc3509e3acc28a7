//! The `RelayConfirmation` sub-state shared by `IN` and `OUT`.
//!
//! A relay moves an active cooperation to a third device.  The side that
//! wants to relay sends `DSOFTBUS_RELAY_COOPERATE` to its peer and waits for
//! `DSOFTBUS_RELAY_COOPERATE_FINISHED`, bounded by the relay timer.  While it
//! waits:
//!
//! - a new local START is answered with `Busy`;
//! - a refusal or timeout fails the request and drops back to `Initial`;
//! - lifecycle events that end the cooperation cancel the relay first and are
//!   then handled as in `Initial`;
//! - input and device events are suppressed.

use coop_core::protocol::messages::{DSoftbusRelayCooperate, PeerMessage};
use coop_core::NetworkId;
use tracing::{debug, warn};

use crate::application::context::Context;
use crate::application::error::CooperateError;
use crate::application::event::{CooperateState, ProtocolStep, StartCooperateEvent};
use crate::application::event_manager::EventInfo;
use crate::application::pending::{PendingRequest, RequestKey};

use super::{is_start_caller, send_stop, ResponseEvent, StepEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelayRequest {
    pub target: NetworkId,
    pub key: RequestKey,
}

/// Sub-state of `IN` and `OUT`.
#[derive(Debug, Default)]
pub(crate) enum Step {
    #[default]
    Initial,
    RelayConfirmation(RelayRequest),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Initial => "Initial",
            Step::RelayConfirmation(_) => "RelayConfirmation",
        }
    }
}

/// What the owning state should do after the sub-state saw an event.
pub(crate) enum RelayOutcome {
    /// Keep waiting.
    Stay,
    /// The relay failed and was answered; return to `Initial`.
    Failed,
    /// The peer accepted; the owning state finishes the relay.
    Completed(RelayRequest),
    /// The relay was cancelled; handle the event as `Initial` would.
    Cancelled(StepEvent),
    /// Unrelated to the relay; handle as `Initial` without leaving the sub-state.
    Passthrough(StepEvent),
}

/// Sends `RELAY_COOPERATE` for `target` to the bound peer, arms the relay
/// timer and parks the request.  Answers the request itself on failure.
pub(crate) fn begin_relay(ctx: &mut Context, ev: StartCooperateEvent) -> Option<RelayRequest> {
    let target = ev.remote_network_id.clone();
    let peer = ctx.peer().clone();
    let key = RequestKey {
        pid: ev.pid,
        user_data: ev.user_data,
    };
    ctx.event_mgr.start_cooperate(EventInfo {
        pid: ev.pid,
        user_data: ev.user_data,
        network_id: target.clone(),
    });
    let relay = PeerMessage::RelayCooperate(DSoftbusRelayCooperate {
        network_id: ctx.local().clone(),
        normal: true,
        target_network_id: target.clone(),
    });
    let armed = ctx
        .dsoftbus
        .send(&peer, &relay)
        .map_err(CooperateError::from)
        .and_then(|()| Ok(ctx.arm_timer(ProtocolStep::Relay, &peer, key)?));
    let timer = match armed {
        Ok(timer) => timer,
        Err(e) => {
            ctx.event_mgr.start_cooperate_finish(&target, Some(e.code()));
            ev.reply.respond(Err(e));
            return None;
        }
    };
    debug!("relay to {} requested", target.anonymized());
    ctx.park_request(PendingRequest {
        pid: ev.pid,
        user_data: ev.user_data,
        network_id: target.clone(),
        step: ProtocolStep::Relay,
        timer,
        reply: ev.reply,
    });
    Some(RelayRequest { target, key })
}

/// Answers the parked relay request with success.
pub(crate) fn finish_relay(ctx: &mut Context, request: &RelayRequest) {
    if let Some(pending) = ctx.pending.take(request.key) {
        ctx.event_mgr.start_cooperate_finish(&request.target, None);
        ctx.finish_request(pending, Ok(()));
    }
}

/// Answers the parked relay request with `error`.
pub(crate) fn fail_relay(ctx: &mut Context, request: &RelayRequest, error: CooperateError) {
    if let Some(pending) = ctx.pending.take(request.key) {
        ctx.event_mgr
            .start_cooperate_finish(&request.target, Some(error.code()));
        ctx.finish_request(pending, Err(error));
    }
}

/// The peer accepted the relay but the target could not be started.  The
/// peer has already let go of us, so the request fails and cooperation ends.
pub(crate) fn abandon_relay(
    ctx: &mut Context,
    request: &RelayRequest,
    error: CooperateError,
) -> Option<CooperateState> {
    warn!("relay to {} abandoned: {error}", request.target.anonymized());
    fail_relay(ctx, request, error);
    send_stop(ctx);
    Some(CooperateState::Free)
}

/// Whether `event` ends the cooperation the relay belongs to.
fn ends_cooperation(ctx: &Context, request: &RelayRequest, event: &StepEvent) -> bool {
    let involved = |id: &NetworkId| ctx.is_peer(id) || *id == request.target;
    match event {
        StepEvent::Stop(_) | StepEvent::Disable => true,
        StepEvent::AppClosed { pid } => {
            is_start_caller(ctx, *pid)
                || ctx
                    .pending
                    .find_step(ProtocolStep::Relay)
                    .map_or(false, |p| p.pid == *pid)
        }
        StepEvent::BoardOffline { network_id } | StepEvent::SessionClosed { network_id } => {
            involved(network_id)
        }
        StepEvent::SwitchChanged { network_id, normal } => !normal && involved(network_id),
        StepEvent::RemoteStop(ev) => ctx.is_peer(&ev.network_id),
        StepEvent::ComeBack(ev) => ctx.is_peer(&ev.network_id),
        _ => false,
    }
}

/// Runs one event through the `RelayConfirmation` sub-state.
pub(crate) fn on_relay_event(
    ctx: &mut Context,
    request: &RelayRequest,
    event: StepEvent,
) -> RelayOutcome {
    match event {
        StepEvent::Response(ResponseEvent::RelayFinished(ev)) => {
            if !ctx.is_peer(&ev.network_id) || ev.target_network_id != request.target {
                debug!("stale RELAY_FINISHED from {} ignored", ev.network_id.anonymized());
                return RelayOutcome::Stay;
            }
            if ev.normal {
                return RelayOutcome::Completed(request.clone());
            }
            fail_relay(ctx, request, CooperateError::Rejected);
            RelayOutcome::Failed
        }
        StepEvent::Timeout(ev) => {
            let key = RequestKey {
                pid: ev.pid,
                user_data: ev.user_data,
            };
            if ev.step == ProtocolStep::Relay && key == request.key {
                fail_relay(ctx, request, CooperateError::Timeout);
                return RelayOutcome::Failed;
            }
            RelayOutcome::Stay
        }
        StepEvent::Start(ev) => {
            ev.reply.respond(Err(CooperateError::Busy));
            RelayOutcome::Stay
        }
        event if ends_cooperation(ctx, request, &event) => {
            fail_relay(ctx, request, CooperateError::Cancelled);
            RelayOutcome::Cancelled(event)
        }
        event @ (StepEvent::Stop(_)
        | StepEvent::Disable
        | StepEvent::AppClosed { .. }
        | StepEvent::BoardOffline { .. }
        | StepEvent::SessionClosed { .. }
        | StepEvent::SwitchChanged { .. }
        | StepEvent::RemoteStop(_)
        | StepEvent::RemoteStart(_)
        | StepEvent::ComeBack(_)) => RelayOutcome::Passthrough(event),
        other => {
            debug!("{other:?} suppressed while relaying");
            RelayOutcome::Stay
        }
    }
}
