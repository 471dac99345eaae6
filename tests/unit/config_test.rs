//! Tests for configuration validation

use std::collections::HashMap;

use track_arbiter::config::{ActionPolicy, DetectionTrigger, EngineConfig, VictimPolicy};

#[test]
fn test_default_config_is_valid() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.detection, DetectionTrigger::OnDemand);
    assert_eq!(cfg.victim, VictimPolicy::SmallestId);
    assert_eq!(cfg.action, ActionPolicy::CancelRequest);
}

#[test]
fn test_invalid_monitor_interval() {
    let cfg = EngineConfig {
        monitor_interval_ms: 0,
        ..EngineConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_audit_capacity() {
    let cfg = EngineConfig {
        audit_capacity: 10_000_000,
        ..EngineConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "detection": "per_mutation",
        "victim": "lowest_priority",
        "action": "preempt_holder",
        "auto_resolve": true
    }"#;

    let cfg = EngineConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.detection, DetectionTrigger::PerMutation);
    assert_eq!(cfg.victim, VictimPolicy::LowestPriority);
    assert_eq!(cfg.action, ActionPolicy::PreemptHolder);
    assert!(cfg.auto_resolve);
    assert_eq!(cfg.audit_capacity, EngineConfig::default().audit_capacity);
}

#[test]
fn test_config_from_json_rejects_unknown_policy() {
    assert!(EngineConfig::from_json_str(r#"{"victim": "random"}"#).is_err());
}

#[test]
fn test_config_from_lookup() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("TRACK_ARBITER_DETECTION", "PER_MUTATION"),
        ("TRACK_ARBITER_VICTIM", "fewest_held"),
        ("TRACK_ARBITER_AUTO_RESOLVE", "true"),
        ("TRACK_ARBITER_MONITOR_INTERVAL_MS", "250"),
    ]);
    let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(cfg.detection, DetectionTrigger::PerMutation);
    assert_eq!(cfg.victim, VictimPolicy::FewestHeld);
    assert!(cfg.auto_resolve);
    assert_eq!(cfg.monitor_interval_ms, 250);
}

#[test]
fn test_config_from_lookup_rejects_bad_scalar() {
    let result = EngineConfig::from_lookup(|k| {
        (k == "TRACK_ARBITER_AUDIT_CAPACITY").then(|| "lots".to_string())
    });
    assert!(result.unwrap_err().contains("TRACK_ARBITER_AUDIT_CAPACITY"));
}

#[test]
fn test_config_from_missing_path() {
    let err = EngineConfig::from_path("/nonexistent/track-arbiter.json").unwrap_err();
    assert!(format!("{err:#}").contains("reading engine config"));
}

#[test]
fn test_config_from_process_env() {
    std::env::set_var("TRACK_ARBITER_VICTIM", "fewest_held");
    std::env::set_var("TRACK_ARBITER_MONITOR_INTERVAL_MS", "250");
    let cfg = EngineConfig::from_env();
    std::env::remove_var("TRACK_ARBITER_VICTIM");
    std::env::remove_var("TRACK_ARBITER_MONITOR_INTERVAL_MS");

    let cfg = cfg.unwrap();
    assert_eq!(cfg.victim, VictimPolicy::FewestHeld);
    assert_eq!(cfg.monitor_interval_ms, 250);
    assert_eq!(cfg.action, ActionPolicy::CancelRequest);
}
