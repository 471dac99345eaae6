//! Agent state: what each train holds and what it is waiting for.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::AllocationError;
use crate::util::{Priority, TrackId, TrainId};

/// Movement status of a train. Maintained by the external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainStatus {
    /// Not moving, no intent.
    #[default]
    Idle,
    /// Travelling over held tracks.
    Moving,
    /// Halted, typically waiting for a track.
    Stopped,
}

/// A train and its allocation-relevant fields.
///
/// Equality compares the serialized fields only; arrival sequence numbers and
/// cancellation markers are engine bookkeeping and do not survive serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    /// Train identifier.
    pub id: TrainId,
    /// Human-readable name.
    pub name: String,
    /// Movement status.
    pub status: TrainStatus,
    /// Priority for victim selection.
    pub priority: Priority,
    /// Tracks currently owned by this train.
    pub held_tracks: BTreeSet<TrackId>,
    /// Outstanding requests in request order. Disjoint from `held_tracks`.
    pub pending_requests: Vec<TrackId>,
    /// Most recently granted track still held.
    pub current_track: Option<TrackId>,
    /// Arrival sequence number of each pending request.
    #[serde(skip)]
    pub(crate) request_seq: HashMap<TrackId, u64>,
    /// Requests settled by cancellation that a racing allocate must not revive.
    #[serde(skip)]
    pub(crate) resolved: BTreeSet<TrackId>,
}

impl PartialEq for Train {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.status == other.status
            && self.priority == other.priority
            && self.held_tracks == other.held_tracks
            && self.pending_requests == other.pending_requests
            && self.current_track == other.current_track
    }
}

impl Eq for Train {}

impl Train {
    /// Create an idle train with normal priority.
    pub fn new(id: TrainId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: TrainStatus::Idle,
            priority: Priority::Normal,
            held_tracks: BTreeSet::new(),
            pending_requests: Vec::new(),
            current_track: None,
            request_seq: HashMap::new(),
            resolved: BTreeSet::new(),
        }
    }

    /// Builder-style priority override.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// True when `track` is among the pending requests.
    pub fn is_pending(&self, track: TrackId) -> bool {
        self.pending_requests.contains(&track)
    }

    /// Arrival sequence number of a pending request.
    pub fn request_sequence(&self, track: TrackId) -> Option<u64> {
        self.request_seq.get(&track).copied()
    }
}

/// All trains, iterated in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    trains: BTreeMap<TrainId, Train>,
}

impl AgentState {
    /// Create an empty agent table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a train. Fails if the id is taken.
    pub fn insert(&mut self, train: Train) -> Result<(), AllocationError> {
        if self.trains.contains_key(&train.id) {
            return Err(AllocationError::InvalidState(format!(
                "{} already registered",
                train.id
            )));
        }
        self.trains.insert(train.id, train);
        Ok(())
    }

    /// Remove a train record.
    pub fn remove(&mut self, id: TrainId) -> Result<Train, AllocationError> {
        self.trains
            .remove(&id)
            .ok_or(AllocationError::train_not_found(id))
    }

    /// Look up a train.
    pub fn get(&self, id: TrainId) -> Result<&Train, AllocationError> {
        self.trains
            .get(&id)
            .ok_or(AllocationError::train_not_found(id))
    }

    pub(crate) fn get_mut(&mut self, id: TrainId) -> Result<&mut Train, AllocationError> {
        self.trains
            .get_mut(&id)
            .ok_or(AllocationError::train_not_found(id))
    }

    /// Record a pending request. Returns `false` if already pending.
    pub fn add_pending(
        &mut self,
        id: TrainId,
        track: TrackId,
        seq: u64,
    ) -> Result<bool, AllocationError> {
        let train = self.get_mut(id)?;
        train.resolved.remove(&track);
        if train.is_pending(track) {
            return Ok(false);
        }
        train.pending_requests.push(track);
        train.request_seq.insert(track, seq);
        Ok(true)
    }

    /// Drop a pending request. Returns whether it was pending.
    pub fn remove_pending(&mut self, id: TrainId, track: TrackId) -> Result<bool, AllocationError> {
        let train = self.get_mut(id)?;
        let before = train.pending_requests.len();
        train.pending_requests.retain(|t| *t != track);
        train.request_seq.remove(&track);
        Ok(train.pending_requests.len() != before)
    }

    /// Move a track into the held set.
    pub fn add_held(&mut self, id: TrainId, track: TrackId) -> Result<(), AllocationError> {
        let train = self.get_mut(id)?;
        train.held_tracks.insert(track);
        train.current_track = Some(track);
        Ok(())
    }

    /// Remove a track from the held set. Returns whether it was held.
    pub fn remove_held(&mut self, id: TrainId, track: TrackId) -> Result<bool, AllocationError> {
        let train = self.get_mut(id)?;
        let removed = train.held_tracks.remove(&track);
        if train.current_track == Some(track) {
            train.current_track = None;
        }
        Ok(removed)
    }

    /// Remember that a request was settled by cancellation.
    pub(crate) fn mark_resolved(&mut self, id: TrainId, track: TrackId) -> Result<(), AllocationError> {
        self.get_mut(id)?.resolved.insert(track);
        Ok(())
    }

    /// Consume a cancellation marker. Returns whether one existed.
    pub(crate) fn take_resolved(&mut self, id: TrainId, track: TrackId) -> Result<bool, AllocationError> {
        Ok(self.get_mut(id)?.resolved.remove(&track))
    }

    /// Drop every cancellation marker for a track that no longer exists.
    pub(crate) fn forget_track(&mut self, track: TrackId) {
        for train in self.trains.values_mut() {
            train.resolved.remove(&track);
        }
    }

    /// Iterate trains in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    /// Number of registered trains.
    pub fn len(&self) -> usize {
        self.trains.len()
    }

    /// True when no train is registered.
    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }
}
