//! Pluggable deadlock resolution: who is sacrificed and how.
//!
//! A [`ResolutionPolicy`] pairs a [`VictimSelector`] with a [`ResolutionAction`].
//! Both only *plan*; the engine applies the resulting [`Remedy`] list under its
//! state lock. Every action removes at least one edge of the cycle it was given,
//! so the same cycle cannot be reported again after it is applied.

use serde::{Deserialize, Serialize};

use crate::core::{AgentState, WaitForGraph};
use crate::util::{TrackId, TrainId};

/// Read-only view handed to strategies.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// Agent table at planning time.
    pub agents: &'a AgentState,
    /// Graph the cycle was found in.
    pub graph: &'a WaitForGraph,
}

impl ResolutionContext<'_> {
    /// Train that `cycle[i]` waits on.
    fn successor(cycle: &[TrainId], i: usize) -> TrainId {
        cycle[(i + 1) % cycle.len()]
    }

    /// Train waiting on `cycle[i]`.
    fn predecessor(cycle: &[TrainId], i: usize) -> TrainId {
        cycle[(i + cycle.len() - 1) % cycle.len()]
    }
}

/// A single state change that breaks a wait-for edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Remedy {
    /// Withdraw the train's pending request.
    Cancel {
        /// Requesting train.
        train: TrainId,
        /// Requested track.
        track: TrackId,
    },
    /// Force the train to give up a held track.
    Preempt {
        /// Holding train.
        train: TrainId,
        /// Held track.
        track: TrackId,
    },
}

/// Planned (and, once returned by the engine, applied) resolution of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Cycle that was broken.
    pub cycle: Vec<TrainId>,
    /// Chosen victim.
    pub victim: TrainId,
    /// State changes, in application order.
    pub remedies: Vec<Remedy>,
    /// Selector name.
    pub selector: String,
    /// Action name.
    pub action: String,
}

/// Chooses the victim of a cycle.
pub trait VictimSelector: Send + Sync {
    /// Stable strategy name for logs and audit.
    fn name(&self) -> &'static str;
    /// Pick one member of `cycle`. `cycle` is never empty.
    fn select(&self, cycle: &[TrainId], ctx: ResolutionContext<'_>) -> TrainId;
}

/// Plans the state change that breaks the victim's part of the cycle.
pub trait ResolutionAction: Send + Sync {
    /// Stable strategy name for logs and audit.
    fn name(&self) -> &'static str;
    /// Remedies for `cycle[victim_index]`. Must break at least one cycle edge.
    fn plan(&self, cycle: &[TrainId], victim_index: usize, ctx: ResolutionContext<'_>)
        -> Vec<Remedy>;
}

/// Deterministic default: the smallest train id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallestId;

impl VictimSelector for SmallestId {
    fn name(&self) -> &'static str {
        "smallest_id"
    }

    fn select(&self, cycle: &[TrainId], _ctx: ResolutionContext<'_>) -> TrainId {
        cycle.iter().copied().min().unwrap_or(cycle[0])
    }
}

/// Lowest priority first, ties broken by smallest id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestPriority;

impl VictimSelector for LowestPriority {
    fn name(&self) -> &'static str {
        "lowest_priority"
    }

    fn select(&self, cycle: &[TrainId], ctx: ResolutionContext<'_>) -> TrainId {
        cycle
            .iter()
            .copied()
            .min_by_key(|id| {
                let priority = ctx.agents.get(*id).map(|t| t.priority).unwrap_or_default();
                (priority, *id)
            })
            .unwrap_or(cycle[0])
    }
}

/// FIFO fairness: abort the train whose blocking request arrived last.
#[derive(Debug, Clone, Copy, Default)]
pub struct YoungestRequest;

impl VictimSelector for YoungestRequest {
    fn name(&self) -> &'static str {
        "youngest_request"
    }

    fn select(&self, cycle: &[TrainId], ctx: ResolutionContext<'_>) -> TrainId {
        let arrival = |i: usize| {
            let blocked = cycle[i];
            let holder = ResolutionContext::successor(cycle, i);
            let train = ctx.agents.get(blocked).ok();
            ctx.graph
                .tracks_between(blocked, holder)
                .iter()
                .filter_map(|track| train.and_then(|t| t.request_sequence(*track)))
                .max()
                .unwrap_or(0)
        };
        (0..cycle.len())
            .max_by_key(|&i| (arrival(i), std::cmp::Reverse(cycle[i])))
            .map_or(cycle[0], |i| cycle[i])
    }
}

/// Cost-based: the train holding the fewest tracks loses the least work.
#[derive(Debug, Clone, Copy, Default)]
pub struct FewestHeld;

impl VictimSelector for FewestHeld {
    fn name(&self) -> &'static str {
        "fewest_held"
    }

    fn select(&self, cycle: &[TrainId], ctx: ResolutionContext<'_>) -> TrainId {
        cycle
            .iter()
            .copied()
            .min_by_key(|id| {
                let held = ctx.agents.get(*id).map_or(0, |t| t.held_tracks.len());
                (held, *id)
            })
            .unwrap_or(cycle[0])
    }
}

/// Default action: withdraw the victim's requests on its successor's tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelRequest;

impl ResolutionAction for CancelRequest {
    fn name(&self) -> &'static str {
        "cancel_request"
    }

    fn plan(&self, cycle: &[TrainId], victim_index: usize, ctx: ResolutionContext<'_>) -> Vec<Remedy> {
        let victim = cycle[victim_index];
        let holder = ResolutionContext::successor(cycle, victim_index);
        ctx.graph
            .tracks_between(victim, holder)
            .iter()
            .map(|track| Remedy::Cancel {
                train: victim,
                track: *track,
            })
            .collect()
    }
}

/// Evict the victim from the tracks its predecessor is waiting on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreemptHolder;

impl ResolutionAction for PreemptHolder {
    fn name(&self) -> &'static str {
        "preempt_holder"
    }

    fn plan(&self, cycle: &[TrainId], victim_index: usize, ctx: ResolutionContext<'_>) -> Vec<Remedy> {
        let victim = cycle[victim_index];
        let waiter = ResolutionContext::predecessor(cycle, victim_index);
        ctx.graph
            .tracks_between(waiter, victim)
            .iter()
            .map(|track| Remedy::Preempt {
                train: victim,
                track: *track,
            })
            .collect()
    }
}

/// Victim selection plus remedial action.
pub struct ResolutionPolicy {
    selector: Box<dyn VictimSelector>,
    action: Box<dyn ResolutionAction>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::new(Box::new(SmallestId), Box::new(CancelRequest))
    }
}

impl std::fmt::Debug for ResolutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionPolicy")
            .field("selector", &self.selector.name())
            .field("action", &self.action.name())
            .finish()
    }
}

impl ResolutionPolicy {
    /// Combine a selector and an action.
    pub fn new(selector: Box<dyn VictimSelector>, action: Box<dyn ResolutionAction>) -> Self {
        Self { selector, action }
    }

    /// Selector in use.
    pub fn selector(&self) -> &dyn VictimSelector {
        self.selector.as_ref()
    }

    /// Action in use.
    pub fn action(&self) -> &dyn ResolutionAction {
        self.action.as_ref()
    }

    /// Plan the resolution of `cycle`. Returns `None` for an empty cycle or when the
    /// action finds nothing to change (the cycle is no longer present in `ctx`).
    pub fn plan(&self, cycle: &[TrainId], ctx: ResolutionContext<'_>) -> Option<Resolution> {
        if cycle.is_empty() {
            return None;
        }
        let victim = self.selector.select(cycle, ctx);
        let victim_index = cycle.iter().position(|t| *t == victim)?;
        let remedies = self.action.plan(cycle, victim_index, ctx);
        if remedies.is_empty() {
            return None;
        }
        Some(Resolution {
            cycle: cycle.to_vec(),
            victim,
            remedies,
            selector: self.selector.name().to_string(),
            action: self.action.name().to_string(),
        })
    }
}
