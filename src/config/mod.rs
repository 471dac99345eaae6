//! Configuration models for the allocation engine.

pub mod engine;

pub use engine::{ActionPolicy, DetectionTrigger, EngineConfig, VictimPolicy};
