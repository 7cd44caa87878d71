//! # Core Notification Events
//!
//! Structured events the core emits for whatever presentation layer exists.
//! The core never renders text; collaborators subscribe to a channel of
//! these values and decide how (or whether) to surface them.

use crate::dispatch::Action;

/// A notification from the countdown core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreEvent {
    /// A team's countdown completed. Emitted exactly once per run.
    TeamFinished {
        /// Roster index of the team.
        index: usize,
        /// Team name at completion time.
        name: String,
    },
    /// An action batch was applied.
    ActionApplied {
        /// The action.
        action: Action,
        /// In-range indices the batch touched.
        indices: Vec<usize>,
    },
    /// A scheduler commit advanced at least one team.
    TickCommitted,
    /// The roster was replaced wholesale by an authoritative snapshot.
    RosterReplaced,
}

/// Channel for delivering events between components.
///
/// A thin wrapper over crossbeam keeping the sender and receiver together;
/// subscribers clone the receiver, producers clone the sender.
#[derive(Debug)]
pub struct EventChannel<T> {
    sender: crossbeam_channel::Sender<T>,
    receiver: crossbeam_channel::Receiver<T>,
}

impl<T> EventChannel<T> {
    /// Creates a bounded event channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }

    /// Creates an unbounded event channel.
    #[must_use]
    pub fn unbounded() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Sends an event, dropping it if the channel is full or closed.
    pub fn send(&self, event: T) {
        let _ = self.sender.try_send(event);
    }

    /// Receives the next pending event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Discards all pending events.
    pub fn drain(&self) {
        while self.receiver.try_recv().is_ok() {}
    }

    /// A sender handle for a producer.
    #[must_use]
    pub fn sender(&self) -> crossbeam_channel::Sender<T> {
        self.sender.clone()
    }

    /// A receiver handle for a subscriber.
    #[must_use]
    pub fn receiver(&self) -> crossbeam_channel::Receiver<T> {
        self.receiver.clone()
    }
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let channel = EventChannel::unbounded();
        channel.send(CoreEvent::RosterReplaced);
        channel.send(CoreEvent::TeamFinished {
            index: 1,
            name: "B".to_string(),
        });

        assert_eq!(channel.try_recv(), Some(CoreEvent::RosterReplaced));
        assert!(matches!(
            channel.try_recv(),
            Some(CoreEvent::TeamFinished { index: 1, .. })
        ));
        assert!(channel.try_recv().is_none());
    }

    #[test]
    fn test_bounded_channel_drops_overflow() {
        let channel = EventChannel::new(1);
        channel.send(CoreEvent::RosterReplaced);
        channel.send(CoreEvent::RosterReplaced);
        assert!(channel.try_recv().is_some());
        assert!(channel.try_recv().is_none());
    }
}
