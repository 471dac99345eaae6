//! Builders to construct engine components from configuration.

pub mod engine_builder;

pub use engine_builder::{action_for, build_engine, build_policy, selector_for};
