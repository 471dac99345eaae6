//! Builders to construct an allocation engine from configuration.

use crate::config::{ActionPolicy, EngineConfig, VictimPolicy};
use crate::core::{
    AllocationEngine, AllocationError, CancelRequest, FewestHeld, LowestPriority, PreemptHolder,
    ResolutionAction, ResolutionPolicy, SmallestId, VictimSelector, YoungestRequest,
};

/// Victim selector for a configured policy.
pub fn selector_for(policy: VictimPolicy) -> Box<dyn VictimSelector> {
    match policy {
        VictimPolicy::SmallestId => Box::new(SmallestId),
        VictimPolicy::LowestPriority => Box::new(LowestPriority),
        VictimPolicy::YoungestRequest => Box::new(YoungestRequest),
        VictimPolicy::FewestHeld => Box::new(FewestHeld),
    }
}

/// Resolution action for a configured policy.
pub fn action_for(policy: ActionPolicy) -> Box<dyn ResolutionAction> {
    match policy {
        ActionPolicy::CancelRequest => Box::new(CancelRequest),
        ActionPolicy::PreemptHolder => Box::new(PreemptHolder),
    }
}

/// Resolution policy described by `cfg`.
pub fn build_policy(cfg: &EngineConfig) -> ResolutionPolicy {
    ResolutionPolicy::new(selector_for(cfg.victim), action_for(cfg.action))
}

/// Validate `cfg` and build an empty engine with the configured strategies.
pub fn build_engine(cfg: &EngineConfig) -> Result<AllocationEngine, AllocationError> {
    cfg.validate()
        .map_err(AllocationError::InvalidConfig)?;
    tracing::info!(
        detection = ?cfg.detection,
        victim = ?cfg.victim,
        action = ?cfg.action,
        auto_resolve = cfg.auto_resolve,
        "building allocation engine"
    );
    Ok(AllocationEngine::new(cfg.clone()).with_policy(build_policy(cfg)))
}
