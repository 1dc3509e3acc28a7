//! Local requests waiting on a peer handshake.
//!
//! A `START` (or the relay it turns into) is answered only once the peer has
//! replied, so its [`Responder`] is parked here together with the timer that
//! bounds the wait.  Entries are keyed by the caller's pid and `user_data`,
//! since different clients pick their `user_data` independently.

use std::collections::BTreeMap;

use coop_core::NetworkId;

use crate::application::collaborators::TimerId;
use crate::application::event::{ProtocolStep, Responder};

/// Identifies one request: the calling process and its `user_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
    pub pid: i32,
    pub user_data: i32,
}

#[derive(Debug)]
pub struct PendingRequest {
    pub pid: i32,
    pub user_data: i32,
    /// Device the handshake is addressed to.
    pub network_id: NetworkId,
    pub step: ProtocolStep,
    pub timer: TimerId,
    pub reply: Responder<()>,
}

impl PendingRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey {
            pid: self.pid,
            user_data: self.user_data,
        }
    }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: BTreeMap<RequestKey, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a request.  Returns the request it displaced, if any.
    pub fn insert(&mut self, request: PendingRequest) -> Option<PendingRequest> {
        self.requests.insert(request.key(), request)
    }

    pub fn take(&mut self, key: RequestKey) -> Option<PendingRequest> {
        self.requests.remove(&key)
    }

    /// Removes the oldest request of the given step.
    pub fn take_step(&mut self, step: ProtocolStep) -> Option<PendingRequest> {
        let key = self.find_step(step)?.key();
        self.requests.remove(&key)
    }

    pub fn find_step(&self, step: ProtocolStep) -> Option<&PendingRequest> {
        self.requests.values().find(|req| req.step == step)
    }

    pub fn has_step(&self, step: ProtocolStep) -> bool {
        self.find_step(step).is_some()
    }

    pub fn drain(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.requests).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::CooperateError;
    use crate::application::event::ReplyReceiver;

    fn request(user_data: i32, step: ProtocolStep) -> (PendingRequest, ReplyReceiver<()>) {
        request_from(7, user_data, step)
    }

    fn request_from(
        pid: i32,
        user_data: i32,
        step: ProtocolStep,
    ) -> (PendingRequest, ReplyReceiver<()>) {
        let (reply, rx) = Responder::channel();
        let req = PendingRequest {
            pid,
            user_data,
            network_id: NetworkId::from("peer-b"),
            step,
            timer: user_data,
            reply,
        };
        (req, rx)
    }

    #[test]
    fn test_take_step_returns_matching_request() {
        // Arrange
        let mut pending = PendingRequests::new();
        let (start, _rx1) = request(1, ProtocolStep::Start);
        let (relay, _rx2) = request(2, ProtocolStep::Relay);
        pending.insert(start);
        pending.insert(relay);

        // Act
        let taken = pending.take_step(ProtocolStep::Relay).expect("relay");

        // Assert
        assert_eq!(taken.user_data, 2);
        assert!(!pending.has_step(ProtocolStep::Relay));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_insert_with_same_user_data_displaces_previous() {
        let mut pending = PendingRequests::new();
        let (first, _rx1) = request(1, ProtocolStep::Start);
        let (second, _rx2) = request(1, ProtocolStep::Relay);
        assert!(pending.insert(first).is_none());
        assert_eq!(pending.insert(second).map(|r| r.step), Some(ProtocolStep::Start));
    }

    #[test]
    fn test_same_user_data_from_two_callers_is_kept_apart() {
        // Arrange
        let mut pending = PendingRequests::new();
        let (first, _rx1) = request_from(10, 1, ProtocolStep::Start);
        let (second, _rx2) = request_from(11, 1, ProtocolStep::Relay);

        // Act
        let displaced = (pending.insert(first).is_some(), pending.insert(second).is_some());

        // Assert
        assert_eq!(displaced, (false, false));
        assert_eq!(pending.len(), 2);
        let taken = pending
            .take(RequestKey { pid: 10, user_data: 1 })
            .expect("first caller");
        assert_eq!(taken.step, ProtocolStep::Start);
    }

    #[test]
    fn test_drain_empties_and_replies_can_be_cancelled() {
        // Arrange
        let mut pending = PendingRequests::new();
        let (req, mut rx) = request(3, ProtocolStep::Start);
        pending.insert(req);

        // Act
        for req in pending.drain() {
            req.reply.respond(Err(CooperateError::Cancelled));
        }

        // Assert
        assert!(pending.is_empty());
        assert_eq!(rx.try_recv().expect("reply"), Err(CooperateError::Cancelled));
    }
}
