//! Wait-for graph derived from track and train state.
//!
//! The graph is never stored or patched: [`build_graph`] recomputes it from the
//! registry and agent table every time it is needed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::{Track, Train};
use crate::util::{TrackId, TrainId};

/// `blocked` has a pending request on a track owned by `holder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WaitForEdge {
    /// Waiting train.
    pub blocked: TrainId,
    /// Train owning the contested track.
    pub holder: TrainId,
}

/// Directed train-to-train dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitForGraph {
    nodes: BTreeSet<TrainId>,
    edges: Vec<WaitForEdge>,
    adjacency: BTreeMap<TrainId, Vec<TrainId>>,
    contested: BTreeMap<WaitForEdge, Vec<TrackId>>,
}

impl WaitForGraph {
    /// Trains holding or requesting at least one track, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = TrainId> + '_ {
        self.nodes.iter().copied()
    }

    /// Distinct edges, ordered by blocked train then request order.
    pub fn edges(&self) -> &[WaitForEdge] {
        &self.edges
    }

    /// Successors of `train` in request order.
    pub fn successors(&self, train: TrainId) -> &[TrainId] {
        self.adjacency
            .get(&train)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// True if `blocked -> holder` is an edge.
    pub fn has_edge(&self, blocked: TrainId, holder: TrainId) -> bool {
        self.contested.contains_key(&WaitForEdge { blocked, holder })
    }

    /// Tracks that make `blocked` wait on `holder`, in request order.
    pub fn tracks_between(&self, blocked: TrainId, holder: TrainId) -> &[TrackId] {
        self.contested
            .get(&WaitForEdge { blocked, holder })
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of participating trains.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when no train waits on another.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Build the wait-for graph from ground truth.
///
/// For each train (ascending id) and each pending track (request order), if the
/// track is owned by a different train an edge `train -> owner` is added. Pending
/// requests on unknown tracks contribute nothing.
pub fn build_graph<'a, TI, RI>(tracks: TI, trains: RI) -> WaitForGraph
where
    TI: IntoIterator<Item = &'a Track>,
    RI: IntoIterator<Item = &'a Train>,
{
    let owners: HashMap<TrackId, Option<TrainId>> =
        tracks.into_iter().map(|t| (t.id, t.owner)).collect();

    let mut trains: Vec<&Train> = trains.into_iter().collect();
    trains.sort_by_key(|t| t.id);

    let mut graph = WaitForGraph::default();
    for train in trains {
        if !train.pending_requests.is_empty() || !train.held_tracks.is_empty() {
            graph.nodes.insert(train.id);
        }
        for track in &train.pending_requests {
            let Some(Some(holder)) = owners.get(track).copied() else {
                continue;
            };
            if holder == train.id {
                continue;
            }
            let edge = WaitForEdge {
                blocked: train.id,
                holder,
            };
            let via = graph.contested.entry(edge).or_default();
            if via.is_empty() {
                graph.edges.push(edge);
                graph.adjacency.entry(train.id).or_default().push(holder);
            }
            via.push(*track);
        }
    }
    tracing::trace!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "rebuilt wait-for graph"
    );
    graph
}
