//! Channel-based fan-out of allocation events.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::{AllocationEvent, EventPublisher};

/// Fan-out bus over unbounded crossbeam channels.
///
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<AllocationEvent>>>,
}

impl EventBus {
    /// Create a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its receiving end.
    pub fn subscribe(&self) -> Receiver<AllocationEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of live subscribers (as of the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: &AllocationEvent) {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let dropped = before - subscribers.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned disconnected subscribers");
        }
    }
}
