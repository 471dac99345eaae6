//! Cycle detection over the wait-for graph.
//!
//! Each root gets its own recursion stack. The only state shared between roots is
//! the set of nodes that were fully explored without reaching a cycle; such nodes
//! can never lead to one and are skipped. Cost is O(V + E) per pass.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::WaitForGraph;
use crate::util::clock::now_ms;
use crate::util::TrainId;

/// Outcome of a detection pass. Derived data, never a source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockReport {
    /// Whether a circular wait exists.
    pub detected: bool,
    /// Trains of the cycle in traversal order; each waits on the next, the last on
    /// the first. Empty when nothing was detected.
    pub cycle: Vec<TrainId>,
    /// Wall-clock time of the pass, ms since epoch.
    pub timestamp_ms: u128,
    /// State version the pass observed.
    pub state_version: u64,
}

impl DeadlockReport {
    /// Report for a deadlock-free state.
    pub fn clear(state_version: u64) -> Self {
        Self {
            detected: false,
            cycle: Vec::new(),
            timestamp_ms: now_ms(),
            state_version,
        }
    }

    /// Report for a detected cycle.
    pub fn deadlock(cycle: Vec<TrainId>, state_version: u64) -> Self {
        Self {
            detected: true,
            cycle,
            timestamp_ms: now_ms(),
            state_version,
        }
    }

    /// Cycle rotated so that its smallest id comes first.
    pub fn normalized_cycle(&self) -> Vec<TrainId> {
        normalize_cycle(&self.cycle)
    }

    /// True if `cycle` is a rotation of this report's cycle.
    pub fn same_cycle(&self, cycle: &[TrainId]) -> bool {
        self.detected && self.normalized_cycle() == normalize_cycle(cycle)
    }
}

/// Rotate a cycle so it starts at its smallest member.
pub fn normalize_cycle(cycle: &[TrainId]) -> Vec<TrainId> {
    let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    cycle[start..].iter().chain(&cycle[..start]).copied().collect()
}

/// True when every consecutive pair (wrapping) of `cycle` is an edge of `graph`.
pub fn is_cycle_of(graph: &WaitForGraph, cycle: &[TrainId]) -> bool {
    !cycle.is_empty()
        && cycle
            .iter()
            .zip(cycle.iter().cycle().skip(1))
            .all(|(blocked, holder)| graph.has_edge(*blocked, *holder))
}

struct Frame {
    node: TrainId,
    next: usize,
}

/// Find the first cycle, probing roots in ascending id order and successors in
/// request order.
pub fn find_cycle(graph: &WaitForGraph) -> Option<Vec<TrainId>> {
    let mut cleared: HashSet<TrainId> = HashSet::new();
    for root in graph.nodes() {
        if cleared.contains(&root) {
            continue;
        }
        if let Some(cycle) = probe(graph, root, &mut cleared) {
            return Some(cycle);
        }
    }
    None
}

fn probe(graph: &WaitForGraph, root: TrainId, cleared: &mut HashSet<TrainId>) -> Option<Vec<TrainId>> {
    let mut stack = vec![Frame { node: root, next: 0 }];
    let mut on_stack: HashMap<TrainId, usize> = HashMap::from([(root, 0)]);

    while let Some(frame) = stack.last_mut() {
        let node = frame.node;
        if let Some(&succ) = graph.successors(node).get(frame.next) {
            frame.next += 1;
            if let Some(&pos) = on_stack.get(&succ) {
                return Some(stack[pos..].iter().map(|f| f.node).collect());
            }
            if cleared.contains(&succ) {
                continue;
            }
            on_stack.insert(succ, stack.len());
            stack.push(Frame { node: succ, next: 0 });
        } else {
            stack.pop();
            on_stack.remove(&node);
            cleared.insert(node);
        }
    }
    None
}

/// Run a detection pass and build the report.
///
/// # Panics
///
/// Panics if the reported cycle is not a cycle of `graph`; that indicates a bug in
/// the traversal, not caller misuse.
pub fn detect(graph: &WaitForGraph, state_version: u64) -> DeadlockReport {
    match find_cycle(graph) {
        Some(cycle) => {
            assert!(
                is_cycle_of(graph, &cycle),
                "reported cycle {cycle:?} is not a wait-for cycle"
            );
            tracing::warn!(?cycle, state_version, "deadlock detected");
            DeadlockReport::deadlock(cycle, state_version)
        }
        None => {
            tracing::debug!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                state_version,
                "no deadlock"
            );
            DeadlockReport::clear(state_version)
        }
    }
}
