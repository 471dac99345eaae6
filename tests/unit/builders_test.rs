//! Tests for builder modules

use track_arbiter::builders::{build_engine, build_policy};
use track_arbiter::config::{ActionPolicy, EngineConfig, VictimPolicy};
use track_arbiter::core::AllocationError;

#[test]
fn test_build_engine_defaults() {
    let engine = build_engine(&EngineConfig::default()).unwrap();
    assert_eq!(engine.policy().selector().name(), "smallest_id");
    assert_eq!(engine.policy().action().name(), "cancel_request");
    assert_eq!(engine.version(), 0);
}

#[test]
fn test_build_policy_from_config() {
    let cfg = EngineConfig {
        victim: VictimPolicy::YoungestRequest,
        action: ActionPolicy::PreemptHolder,
        ..EngineConfig::default()
    };
    let policy = build_policy(&cfg);
    assert_eq!(policy.selector().name(), "youngest_request");
    assert_eq!(policy.action().name(), "preempt_holder");
}

#[test]
fn test_build_engine_rejects_invalid_config() {
    let cfg = EngineConfig {
        monitor_interval_ms: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        build_engine(&cfg),
        Err(AllocationError::InvalidConfig(_))
    ));
}
