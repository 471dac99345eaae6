//! Engine configuration structures.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of environment variables read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "TRACK_ARBITER_";

/// When detection passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionTrigger {
    /// After every successful mutation.
    PerMutation,
    /// Only when `detect` is called (or by a periodic monitor).
    #[default]
    OnDemand,
}

/// Victim selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimPolicy {
    /// Smallest train id.
    #[default]
    SmallestId,
    /// Lowest priority, then smallest id.
    LowestPriority,
    /// Train whose blocking request arrived last.
    YoungestRequest,
    /// Train holding the fewest tracks.
    FewestHeld,
}

/// Remedial action strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPolicy {
    /// Withdraw the victim's blocking requests.
    #[default]
    CancelRequest,
    /// Take contested tracks away from the victim.
    PreemptHolder,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Detection trigger.
    pub detection: DetectionTrigger,
    /// Victim selection.
    pub victim: VictimPolicy,
    /// Remedial action.
    pub action: ActionPolicy,
    /// Resolve detected cycles immediately instead of only reporting them.
    pub auto_resolve: bool,
    /// Trains holding tracks may only request connected tracks.
    pub enforce_connectivity: bool,
    /// Audit ring buffer size; 0 disables the in-memory trail.
    pub audit_capacity: usize,
    /// Check state invariants after every mutation.
    pub verify_invariants: bool,
    /// Period of the background deadlock monitor, in milliseconds.
    pub monitor_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionTrigger::OnDemand,
            victim: VictimPolicy::SmallestId,
            action: ActionPolicy::CancelRequest,
            auto_resolve: false,
            enforce_connectivity: false,
            audit_capacity: 1024,
            verify_invariants: cfg!(debug_assertions),
            monitor_interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.monitor_interval_ms == 0 {
            return Err("monitor_interval_ms must be greater than 0".into());
        }
        if self.audit_capacity > 1_000_000 {
            return Err("audit_capacity must not exceed 1000000".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading engine config {}", path.display()))
    }

    /// Build configuration from `TRACK_ARBITER_*` environment variables, loading a
    /// `.env` file first if present. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by [`Self::from_env`]).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();
        if let Some(v) = get("DETECTION") {
            cfg.detection = parse_enum("DETECTION", &v)?;
        }
        if let Some(v) = get("VICTIM") {
            cfg.victim = parse_enum("VICTIM", &v)?;
        }
        if let Some(v) = get("ACTION") {
            cfg.action = parse_enum("ACTION", &v)?;
        }
        if let Some(v) = get("AUTO_RESOLVE") {
            cfg.auto_resolve = parse_scalar("AUTO_RESOLVE", &v)?;
        }
        if let Some(v) = get("ENFORCE_CONNECTIVITY") {
            cfg.enforce_connectivity = parse_scalar("ENFORCE_CONNECTIVITY", &v)?;
        }
        if let Some(v) = get("AUDIT_CAPACITY") {
            cfg.audit_capacity = parse_scalar("AUDIT_CAPACITY", &v)?;
        }
        if let Some(v) = get("VERIFY_INVARIANTS") {
            cfg.verify_invariants = parse_scalar("VERIFY_INVARIANTS", &v)?;
        }
        if let Some(v) = get("MONITOR_INTERVAL_MS") {
            cfg.monitor_interval_ms = parse_scalar("MONITOR_INTERVAL_MS", &v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_enum<T: DeserializeOwned>(name: &str, value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))
}

fn parse_scalar<T>(name: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))
}
