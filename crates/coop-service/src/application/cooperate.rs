//! The cooperate plugin: one worker thread, one channel, one state machine.
//!
//! # Threading (for beginners)
//!
//! [`Cooperate::new`] spawns the `os_coop` thread, which builds the
//! [`Context`] and the [`StateMachine`] and then loops on the channel.  Every
//! public method here only *posts* an event.  The request methods (`start`,
//! `stop`, `get_cooperate_state`, `dump`) additionally await a one-shot reply,
//! bounded by a guard timeout slightly longer than the longest protocol
//! timer, so a caller can never hang on a lost reply.
//!
//! ```text
//!  IPC thread ──Start──▶ ┌─────────┐      ┌──────────────┐
//!  network    ──packet─▶ │ channel │ ───▶ │ os_coop      │
//!  timers     ──timeout▶ └─────────┘      │ StateMachine │
//!                                         └──────────────┘
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coop_core::NetworkId;
use tracing::{debug, error, info, warn};

use crate::application::channel::{channel, EventReceiver, EventSender};
use crate::application::collaborators::CooperateObserver;
use crate::application::context::{Collaborators, Context, ContextOptions};
use crate::application::error::CooperateError;
use crate::application::event::{
    CooperateEvent, GetCooperateStateEvent, ReplyReceiver, Responder, StartCooperateEvent,
    StopCooperateEvent,
};
use crate::application::state_machine::StateMachine;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "os_coop";

/// Slack added to the longest protocol timer to form the reply guard.
const GUARD_SLACK: Duration = Duration::from_secs(1);

pub struct Cooperate {
    sender: EventSender,
    guard_timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Cooperate {
    /// Spawns the worker.  The context is built on the worker itself, which
    /// is the only thread that ever touches it.
    pub fn new(
        collaborators: Collaborators,
        options: ContextOptions,
    ) -> Result<Self, CooperateError> {
        let (sender, receiver) = channel();
        let worker_sender = sender.clone();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut ctx = Context::new(worker_sender, collaborators, options);
                let mut sm = StateMachine::new();
                run_worker(&mut sm, &mut ctx, receiver);
            })
            .map_err(|e| {
                error!("failed to spawn {WORKER_THREAD_NAME}: {e}");
                CooperateError::WorkerUnavailable
            })?;
        let longest = options.handshake_timeout_ms.max(options.relay_timeout_ms);
        Ok(Self {
            sender,
            guard_timeout: Duration::from_millis(longest) + GUARD_SLACK,
            worker: Some(worker),
        })
    }

    /// A producer handle for collaborators that post events themselves.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn guard_timeout(&self) -> Duration {
        self.guard_timeout
    }

    fn post(&self, event: CooperateEvent) -> Result<(), CooperateError> {
        if self.sender.send(event) {
            Ok(())
        } else {
            Err(CooperateError::WorkerUnavailable)
        }
    }

    async fn await_reply<T>(&self, rx: ReplyReceiver<T>) -> Result<T, CooperateError> {
        match tokio::time::timeout(self.guard_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CooperateError::WorkerUnavailable),
            Err(_) => {
                warn!("no reply within {:?}", self.guard_timeout);
                Err(CooperateError::Timeout)
            }
        }
    }

    // ── Observers and listeners ──────────────────────────────────────────────

    pub fn add_observer(&self, observer: Arc<dyn CooperateObserver>) -> Result<(), CooperateError> {
        self.post(CooperateEvent::AddObserver(observer))
    }

    pub fn remove_observer(
        &self,
        observer: Arc<dyn CooperateObserver>,
    ) -> Result<(), CooperateError> {
        self.post(CooperateEvent::RemoveObserver(observer))
    }

    pub fn register_listener(&self, pid: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::RegisterListener { pid })
    }

    pub fn unregister_listener(&self, pid: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::UnregisterListener { pid })
    }

    pub fn register_hot_area_listener(&self, pid: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::RegisterHotAreaListener { pid })
    }

    pub fn unregister_hot_area_listener(&self, pid: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::UnregisterHotAreaListener { pid })
    }

    /// Subscribes `pid` to mouse locations of `network_id` (local or remote).
    pub fn register_event_listener(
        &self,
        pid: i32,
        network_id: NetworkId,
    ) -> Result<(), CooperateError> {
        self.post(CooperateEvent::RegisterEventListener { pid, network_id })
    }

    pub fn unregister_event_listener(
        &self,
        pid: i32,
        network_id: NetworkId,
    ) -> Result<(), CooperateError> {
        self.post(CooperateEvent::UnregisterEventListener { pid, network_id })
    }

    /// Forwards a system broadcast; screen off and lock end cooperation.
    pub fn on_common_event(&self, name: &str) -> Result<(), CooperateError> {
        self.post(CooperateEvent::CommonEvent {
            name: name.to_string(),
        })
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    pub fn enable(&self, pid: i32, user_data: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::Enable { pid, user_data })
    }

    pub fn disable(&self, pid: i32, user_data: i32) -> Result<(), CooperateError> {
        self.post(CooperateEvent::Disable { pid, user_data })
    }

    /// Moves keyboard and mouse to `remote_network_id`.  Resolves once the
    /// peer has completed the handshake.
    pub async fn start(
        &self,
        pid: i32,
        user_data: i32,
        remote_network_id: NetworkId,
        start_device_id: i32,
    ) -> Result<(), CooperateError> {
        let (reply, rx) = Responder::channel();
        self.post(CooperateEvent::Start(StartCooperateEvent {
            pid,
            user_data,
            remote_network_id,
            start_device_id,
            reply,
        }))?;
        self.await_reply(rx).await
    }

    pub async fn stop(
        &self,
        pid: i32,
        user_data: i32,
        is_unchained: bool,
    ) -> Result<(), CooperateError> {
        let (reply, rx) = Responder::channel();
        self.post(CooperateEvent::Stop(StopCooperateEvent {
            pid,
            user_data,
            is_unchained,
            reply,
        }))?;
        self.await_reply(rx).await
    }

    /// Whether the cooperate switch of `network_id` is on.
    pub async fn get_cooperate_state(
        &self,
        pid: i32,
        user_data: i32,
        network_id: NetworkId,
    ) -> Result<bool, CooperateError> {
        let (reply, rx) = Responder::channel();
        self.post(CooperateEvent::GetCooperateState(GetCooperateStateEvent {
            pid,
            user_data,
            network_id,
            reply,
        }))?;
        self.await_reply(rx).await
    }

    pub async fn dump(&self) -> Result<String, CooperateError> {
        let (reply, rx) = Responder::channel();
        self.post(CooperateEvent::Dump { reply })?;
        self.await_reply(rx).await
    }

    /// Posts `QUIT` and joins the worker.  Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.sender.send(CooperateEvent::Quit);
        if worker.join().is_err() {
            error!("{WORKER_THREAD_NAME} panicked");
        }
    }
}

impl Drop for Cooperate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The worker loop: events are handled strictly in arrival order.
fn run_worker(sm: &mut StateMachine, ctx: &mut Context, mut receiver: EventReceiver) {
    info!("{WORKER_THREAD_NAME} started for {}", ctx.local().anonymized());
    while let Some(event) = receiver.blocking_recv() {
        match event {
            CooperateEvent::Noop => continue,
            CooperateEvent::Quit => break,
            event => sm.on_event(ctx, event),
        }
    }
    sm.on_quit(ctx);
    debug!("{WORKER_THREAD_NAME} stopped");
}

#[cfg(test)]
mod tests {
    use coop_core::protocol::messages::{
        DSoftbusStartCooperateFinished, DSoftbusStartCooperateResponse, PeerMessage,
    };
    use coop_core::{InputDevice, NormalizedCoordinate};

    use super::*;
    use crate::infrastructure::mock::MockCollaborators;

    fn mocks_with_mouse() -> MockCollaborators {
        let mocks = MockCollaborators::new("local-a");
        mocks.devices.push(InputDevice {
            id: 5,
            name: "USB Mouse".into(),
            phys: "usb-5".into(),
            is_pointer: true,
            ..Default::default()
        });
        mocks
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_guard_timeout_exceeds_longest_protocol_timer() {
        let mocks = MockCollaborators::new("local-a");
        let options = ContextOptions {
            handshake_timeout_ms: 2000,
            relay_timeout_ms: 4000,
            ..ContextOptions::default()
        };
        let cooperate = Cooperate::new(mocks.collaborators(), options).expect("worker");
        assert_eq!(cooperate.guard_timeout(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_start_with_unknown_device_fails_fast() {
        // Arrange
        let mocks = mocks_with_mouse();
        let cooperate =
            Cooperate::new(mocks.collaborators(), ContextOptions::default()).expect("worker");
        cooperate.enable(1, 0).expect("enable");

        // Act
        let result = cooperate.start(1, 7, NetworkId::from("peer-b"), 99).await;

        // Assert
        assert_eq!(result, Err(CooperateError::InvalidDevice(99)));
    }

    #[tokio::test]
    async fn test_start_resolves_after_peer_finishes_handshake() {
        // Arrange
        let mocks = mocks_with_mouse();
        let cooperate =
            Cooperate::new(mocks.collaborators(), ContextOptions::default()).expect("worker");
        cooperate.enable(1, 0).expect("enable");
        let peer = NetworkId::from("peer-b");
        let transport = mocks.transport.clone();

        // Act
        let pending = cooperate.start(1, 7, peer.clone(), 5);
        let answer = async {
            wait_until(|| !transport.sent_to(&peer).is_empty()).await;
            transport.deliver(
                "peer-b",
                &PeerMessage::StartCooperateResponse(DSoftbusStartCooperateResponse {
                    network_id: peer.clone(),
                    normal: true,
                }),
            );
            transport.deliver(
                "peer-b",
                &PeerMessage::StartCooperateFinished(DSoftbusStartCooperateFinished {
                    network_id: peer.clone(),
                    origin_network_id: NetworkId::from("local-a"),
                    success: true,
                    start_device_dhid: "Input_xyz".into(),
                    cursor_pos: NormalizedCoordinate::new(50, 50),
                    flag: 0,
                }),
            );
        };
        let (result, ()) = tokio::join!(pending, answer);

        // Assert
        assert_eq!(result, Ok(()));
        let dump = cooperate.dump().await.expect("dump");
        assert!(dump.starts_with("cooperate state: OUT/Initial"), "{dump}");
    }

    #[tokio::test]
    async fn test_get_cooperate_state_reads_profile_switch() {
        let mocks = MockCollaborators::new("local-a");
        mocks.profiles.set_switch("peer-b", false);
        let cooperate =
            Cooperate::new(mocks.collaborators(), ContextOptions::default()).expect("worker");
        let on = cooperate
            .get_cooperate_state(1, 2, NetworkId::from("peer-b"))
            .await;
        assert_eq!(on, Ok(false));
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_report_worker_unavailable() {
        // Arrange
        let mocks = MockCollaborators::new("local-a");
        let mut cooperate =
            Cooperate::new(mocks.collaborators(), ContextOptions::default()).expect("worker");

        // Act
        cooperate.shutdown();
        cooperate.shutdown();

        // Assert
        assert_eq!(cooperate.register_listener(1), Err(CooperateError::WorkerUnavailable));
        assert_eq!(cooperate.dump().await, Err(CooperateError::WorkerUnavailable));
    }
}
