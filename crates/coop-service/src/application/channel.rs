//! The FIFO event channel between producers and the cooperate worker.
//!
//! Any number of [`EventSender`] clones may post from any thread; exactly one
//! [`EventReceiver`] is drained by the worker.  The channel is unbounded so a
//! producer on a network or input thread never blocks.

use tokio::sync::mpsc;
use tracing::warn;

use crate::application::event::CooperateEvent;

/// Creates a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer handle.  Cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<CooperateEvent>,
}

impl EventSender {
    /// Posts an event.  Returns `false` when the worker has gone away.
    pub fn send(&self, event: CooperateEvent) -> bool {
        let name = event.name();
        if self.tx.send(event).is_err() {
            warn!("event {name} dropped: cooperate worker has stopped");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle owned by the worker.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<CooperateEvent>,
}

impl EventReceiver {
    /// Blocks the current (non-async) thread until an event arrives.
    ///
    /// Returns `None` once every sender has been dropped.
    pub fn blocking_recv(&mut self) -> Option<CooperateEvent> {
        self.rx.blocking_recv()
    }

    pub async fn recv(&mut self) -> Option<CooperateEvent> {
        self.rx.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<CooperateEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_delivered_in_fifo_order() {
        // Arrange
        let (tx, mut rx) = channel();

        // Act
        tx.send(CooperateEvent::RegisterListener { pid: 1 });
        tx.send(CooperateEvent::Noop);
        tx.send(CooperateEvent::Quit);

        // Assert
        assert!(matches!(rx.try_recv(), Some(CooperateEvent::RegisterListener { pid: 1 })));
        assert!(matches!(rx.try_recv(), Some(CooperateEvent::Noop)));
        assert!(matches!(rx.try_recv(), Some(CooperateEvent::Quit)));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped_returns_false() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.send(CooperateEvent::Noop));
        assert!(tx.is_closed());
    }
}
