//! Allocation event notification backends.

pub mod channel;

use serde::{Deserialize, Serialize};

use crate::core::{DeadlockReport, Resolution};
use crate::util::{TrackId, TrainId};

pub use channel::EventBus;

/// Events published by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AllocationEvent {
    /// `train` is first in line for an available track and may now allocate it.
    Eligible {
        /// Train at the head of the queue.
        train: TrainId,
        /// Available track.
        track: TrackId,
    },
    /// A detection pass found a cycle.
    DeadlockDetected(DeadlockReport),
    /// A resolution was applied.
    Resolved(Resolution),
}

/// Abstraction for event delivery.
pub trait EventPublisher: Send + Sync {
    /// Deliver an event to every live subscriber. Must not block.
    fn publish(&self, event: &AllocationEvent);
}
