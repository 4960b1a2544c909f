use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::reporting::domain::change_event::ChangeEvent;

/// Fan-out bus: every subscriber receives every event published after it
/// subscribed, in publish order.
///
/// Each subscriber owns its own channel, so a slow or absent reader never
/// takes events away from the others. Subscribers that have been dropped
/// are pruned on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<ChangeEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.lock().push(sender);
        Subscription { receiver }
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<ChangeEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live view of the bus. Dropping it unsubscribes.
pub struct Subscription {
    receiver: Receiver<ChangeEvent>,
}

impl Subscription {
    /// Block until the next event. `None` once every bus handle is gone.
    pub fn recv(&self) -> Option<ChangeEvent> {
        self.receiver.recv().ok()
    }

    /// Wait up to `timeout`. `Err(Disconnected)` once every bus handle is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Events already queued for this subscriber, without blocking.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Iterator for Subscription {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<ChangeEvent> {
        self.recv()
    }
}
