//! Client-facing coordination notifications.
//!
//! `EventManager` remembers which client processes listen for cooperation
//! messages and which client issued the last `ENABLE`, `START`, `STOP` and
//! `GET_COOPERATE_STATE` call, and turns protocol milestones into
//! [`CoordinationMessage`] notifications through the [`ClientNotifier`].

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use coop_core::NetworkId;
use tracing::{debug, info};

use crate::application::collaborators::ClientNotifier;
use crate::application::error::RET_OK;

/// Message delivered to coordination listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CoordinationMessage {
    Prepare = 0,
    Unprepare = 1,
    Activate = 2,
    ActivateSuccess = 3,
    ActivateFail = 4,
    DeactivateSuccess = 5,
    DeactivateFail = 6,
    SessionClosed = 7,
}

/// Which API call an [`EventInfo`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Enable,
    Start,
    Stop,
    State,
}

/// The originator of an API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub pid: i32,
    pub user_data: i32,
    pub network_id: NetworkId,
}

pub struct EventManager {
    notifier: Arc<dyn ClientNotifier>,
    listeners: BTreeSet<i32>,
    calls: HashMap<CallKind, EventInfo>,
}

impl EventManager {
    pub fn new(notifier: Arc<dyn ClientNotifier>) -> Self {
        Self {
            notifier,
            listeners: BTreeSet::new(),
            calls: HashMap::new(),
        }
    }

    /// Adds a coordination listener.  Re-registering a pid replaces its entry.
    pub fn add_listener(&mut self, pid: i32) {
        if !self.listeners.insert(pid) {
            debug!("listener {pid} re-registered");
        }
    }

    pub fn remove_listener(&mut self, pid: i32) {
        self.listeners.remove(&pid);
    }

    pub fn has_listener(&self, pid: i32) -> bool {
        self.listeners.contains(&pid)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Forgets every registration of a dead process.
    pub fn on_client_died(&mut self, pid: i32) {
        info!("client {pid} died, removing its coordination listener");
        self.listeners.remove(&pid);
        self.calls.retain(|_, info| info.pid != pid);
    }

    pub fn last_call(&self, kind: CallKind) -> Option<&EventInfo> {
        self.calls.get(&kind)
    }

    // ── Recorded calls ───────────────────────────────────────────────────────

    pub fn enable_cooperate(&mut self, info: EventInfo) {
        self.calls.insert(CallKind::Enable, info);
    }

    /// Tells the client whose `ENABLE` could not bring the service up.  The
    /// call itself was already acknowledged, so this is its only answer.
    pub fn enable_cooperate_failed(&mut self, err_code: i32) {
        if let Some(call) = self.calls.remove(&CallKind::Enable) {
            self.notifier.notify_coordination_message(
                call.pid,
                call.user_data,
                &call.network_id,
                CoordinationMessage::Unprepare,
                err_code,
            );
        }
    }

    pub fn get_cooperate_state(&mut self, info: EventInfo) {
        self.calls.insert(CallKind::State, info);
    }

    /// Records a local start request and tells listeners it is being prepared.
    pub fn start_cooperate(&mut self, info: EventInfo) {
        let network_id = info.network_id.clone();
        self.calls.insert(CallKind::Start, info);
        self.broadcast(&network_id, CoordinationMessage::Prepare, RET_OK);
    }

    /// Reports the outcome of the recorded start request.
    pub fn start_cooperate_finish(&mut self, network_id: &NetworkId, err_code: Option<i32>) {
        let msg = match err_code {
            None => CoordinationMessage::ActivateSuccess,
            Some(_) => CoordinationMessage::ActivateFail,
        };
        let code = err_code.unwrap_or(RET_OK);
        if let Some(call) = self.calls.get(&CallKind::Start) {
            self.notifier
                .notify_coordination_message(call.pid, call.user_data, network_id, msg, code);
        }
        self.broadcast(network_id, msg, code);
    }

    pub fn remote_start(&self, network_id: &NetworkId) {
        self.broadcast(network_id, CoordinationMessage::Activate, RET_OK);
    }

    pub fn remote_start_finish(&self, network_id: &NetworkId, success: bool) {
        let msg = if success {
            CoordinationMessage::ActivateSuccess
        } else {
            CoordinationMessage::ActivateFail
        };
        self.broadcast(network_id, msg, RET_OK);
    }

    pub fn stop_cooperate(&mut self, info: EventInfo) {
        self.calls.insert(CallKind::Stop, info);
    }

    /// Reports the outcome of the recorded stop request.
    pub fn stop_cooperate_finish(&mut self, network_id: &NetworkId, success: bool) {
        let msg = if success {
            CoordinationMessage::DeactivateSuccess
        } else {
            CoordinationMessage::DeactivateFail
        };
        if let Some(call) = self.calls.remove(&CallKind::Stop) {
            self.notifier
                .notify_coordination_message(call.pid, call.user_data, network_id, msg, RET_OK);
        }
        self.broadcast(network_id, msg, RET_OK);
    }

    /// A peer ended cooperation.
    pub fn remote_stop(&self, network_id: &NetworkId) {
        self.broadcast(network_id, CoordinationMessage::DeactivateSuccess, RET_OK);
    }

    pub fn on_session_closed(&self, network_id: &NetworkId) {
        self.broadcast(network_id, CoordinationMessage::SessionClosed, RET_OK);
    }

    fn broadcast(&self, network_id: &NetworkId, msg: CoordinationMessage, err_code: i32) {
        for &pid in &self.listeners {
            self.notifier
                .notify_coordination_message(pid, 0, network_id, msg, err_code);
        }
    }

    pub fn dump(&self, out: &mut String) {
        let _ = writeln!(out, "  coordination listeners: {:?}", self.listeners);
        let mut kinds: Vec<_> = self.calls.iter().collect();
        kinds.sort_by_key(|(kind, _)| format!("{kind:?}"));
        for (kind, info) in kinds {
            let _ = writeln!(
                out,
                "  last {kind:?}: pid={} user_data={} network_id={}",
                info.pid,
                info.user_data,
                info.network_id.anonymized()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use coop_core::protocol::messages::LocationInfo;

    use super::*;
    use crate::application::hot_area::HotAreaType;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(i32, i32, CoordinationMessage, i32)>>,
    }

    impl ClientNotifier for RecordingNotifier {
        fn notify_coordination_message(
            &self,
            pid: i32,
            user_data: i32,
            _network_id: &NetworkId,
            msg: CoordinationMessage,
            err_code: i32,
        ) {
            self.messages.lock().unwrap().push((pid, user_data, msg, err_code));
        }
        fn notify_hot_area(&self, _pid: i32, _area: HotAreaType, _is_edge: bool) {}
        fn notify_mouse_location(&self, _pid: i32, _network_id: &NetworkId, _location: LocationInfo) {}
    }

    fn make_manager() -> (EventManager, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (EventManager::new(notifier.clone()), notifier)
    }

    fn info(pid: i32, user_data: i32) -> EventInfo {
        EventInfo {
            pid,
            user_data,
            network_id: NetworkId::from("peer-b"),
        }
    }

    #[test]
    fn test_start_finish_notifies_caller_and_listeners() {
        // Arrange
        let (mut mgr, notifier) = make_manager();
        mgr.add_listener(10);
        mgr.start_cooperate(info(20, 7));

        // Act
        mgr.start_cooperate_finish(&NetworkId::from("peer-b"), None);

        // Assert
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(
            *messages,
            vec![
                (10, 0, CoordinationMessage::Prepare, RET_OK),
                (20, 7, CoordinationMessage::ActivateSuccess, RET_OK),
                (10, 0, CoordinationMessage::ActivateSuccess, RET_OK),
            ]
        );
    }

    #[test]
    fn test_failed_start_carries_error_code() {
        let (mut mgr, notifier) = make_manager();
        mgr.start_cooperate(info(20, 7));
        mgr.start_cooperate_finish(&NetworkId::from("peer-b"), Some(-1));
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.last(), Some(&(20, 7, CoordinationMessage::ActivateFail, -1)));
    }

    #[test]
    fn test_failed_enable_answers_only_its_caller() {
        // Arrange
        let (mut mgr, notifier) = make_manager();
        mgr.add_listener(10);
        mgr.enable_cooperate(info(20, 3));

        // Act
        mgr.enable_cooperate_failed(-5);
        mgr.enable_cooperate_failed(-5);

        // Assert
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(*messages, vec![(20, 3, CoordinationMessage::Unprepare, -5)]);
        assert!(mgr.last_call(CallKind::Enable).is_none());
    }

    #[test]
    fn test_reregistering_listener_does_not_duplicate_notifications() {
        // Arrange
        let (mut mgr, notifier) = make_manager();
        mgr.add_listener(10);
        mgr.add_listener(10);

        // Act
        mgr.on_session_closed(&NetworkId::from("peer-b"));

        // Assert
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
        assert_eq!(mgr.listener_count(), 1);
    }

    #[test]
    fn test_client_death_removes_listener_and_calls() {
        // Arrange
        let (mut mgr, _) = make_manager();
        mgr.add_listener(10);
        mgr.stop_cooperate(info(10, 3));

        // Act
        mgr.on_client_died(10);

        // Assert
        assert!(!mgr.has_listener(10));
        assert!(mgr.last_call(CallKind::Stop).is_none());
    }
}
