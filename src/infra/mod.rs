//! Infrastructure adapters for event delivery.

pub mod notify;

pub use notify::{AllocationEvent, EventBus, EventPublisher};
