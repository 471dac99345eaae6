//! Resource registry: authoritative ownership and queue state of every track.
//!
//! The registry is plain data. Atomicity with respect to concurrent callers comes
//! from the engine, which only touches it while holding its state lock.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::AllocationError;
use crate::util::{TrackId, TrainId};

/// Lifecycle status of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    /// Free to be granted.
    Available,
    /// Owned by exactly one train.
    Occupied,
    /// Out of service; no owner, no new requests.
    Maintenance,
}

/// A track segment and its allocation-relevant fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Track identifier.
    pub id: TrackId,
    /// Human-readable name.
    pub name: String,
    /// Current status.
    pub status: TrackStatus,
    /// Owning train, set iff `status == Occupied`.
    pub owner: Option<TrainId>,
    /// Requesting trains in arrival order, without duplicates.
    pub request_queue: VecDeque<TrainId>,
    /// Tracks physically connected to this one.
    pub connected_tracks: BTreeSet<TrackId>,
    /// Maintenance was requested while occupied; applied on release.
    pub maintenance_pending: bool,
}

impl Track {
    /// Create an available, unconnected track.
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: TrackStatus::Available,
            owner: None,
            request_queue: VecDeque::new(),
            connected_tracks: BTreeSet::new(),
            maintenance_pending: false,
        }
    }

    /// Train first in line for this track.
    pub fn queue_head(&self) -> Option<TrainId> {
        self.request_queue.front().copied()
    }

    /// True when the track is out of service now or once released.
    pub const fn in_maintenance(&self) -> bool {
        matches!(self.status, TrackStatus::Maintenance) || self.maintenance_pending
    }
}

/// Registry of all tracks, iterated in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    tracks: BTreeMap<TrackId, Track>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a track. Fails if the id is taken.
    pub fn insert(&mut self, track: Track) -> Result<(), AllocationError> {
        if self.tracks.contains_key(&track.id) {
            return Err(AllocationError::InvalidState(format!(
                "{} already registered",
                track.id
            )));
        }
        self.tracks.insert(track.id, track);
        Ok(())
    }

    /// Remove a track record and drop it from every neighbour's adjacency.
    pub fn remove(&mut self, id: TrackId) -> Result<Track, AllocationError> {
        let removed = self
            .tracks
            .remove(&id)
            .ok_or(AllocationError::track_not_found(id))?;
        for track in self.tracks.values_mut() {
            track.connected_tracks.remove(&id);
        }
        Ok(removed)
    }

    /// Look up a track.
    pub fn get(&self, id: TrackId) -> Result<&Track, AllocationError> {
        self.tracks
            .get(&id)
            .ok_or(AllocationError::track_not_found(id))
    }

    pub(crate) fn get_mut(&mut self, id: TrackId) -> Result<&mut Track, AllocationError> {
        self.tracks
            .get_mut(&id)
            .ok_or(AllocationError::track_not_found(id))
    }

    /// Grant `id` to `train`. Fails unless the track is `Available`.
    pub fn set_owner(&mut self, id: TrackId, train: TrainId) -> Result<(), AllocationError> {
        let track = self.get_mut(id)?;
        match track.status {
            TrackStatus::Available => {
                track.owner = Some(train);
                track.status = TrackStatus::Occupied;
                Ok(())
            }
            TrackStatus::Maintenance => {
                Err(AllocationError::unavailable(id, "under maintenance"))
            }
            TrackStatus::Occupied => Err(AllocationError::unavailable(
                id,
                format!(
                    "held by {}",
                    track.owner.map_or_else(|| "unknown".into(), |o| o.to_string())
                ),
            )),
        }
    }

    /// Clear ownership, returning the previous owner. The track becomes
    /// `Maintenance` if maintenance was pending, otherwise `Available`.
    pub fn clear_owner(&mut self, id: TrackId) -> Result<TrainId, AllocationError> {
        let track = self.get_mut(id)?;
        let owner = track
            .owner
            .take()
            .ok_or_else(|| AllocationError::InvalidState(format!("{id} has no owner")))?;
        if track.maintenance_pending {
            track.maintenance_pending = false;
            track.status = TrackStatus::Maintenance;
        } else {
            track.status = TrackStatus::Available;
        }
        Ok(owner)
    }

    /// Append `train` to the request queue. Returns `false` (no-op) when the train
    /// already owns the track or is already queued.
    pub fn enqueue_request(&mut self, id: TrackId, train: TrainId) -> Result<bool, AllocationError> {
        let track = self.get_mut(id)?;
        if track.owner == Some(train) || track.request_queue.contains(&train) {
            return Ok(false);
        }
        if track.in_maintenance() {
            return Err(AllocationError::unavailable(id, "under maintenance"));
        }
        track.request_queue.push_back(train);
        Ok(true)
    }

    /// Remove `train` from the request queue. Returns whether it was queued.
    pub fn dequeue_request(&mut self, id: TrackId, train: TrainId) -> Result<bool, AllocationError> {
        let track = self.get_mut(id)?;
        let before = track.request_queue.len();
        track.request_queue.retain(|t| *t != train);
        Ok(track.request_queue.len() != before)
    }

    /// Put a track into or out of maintenance.
    pub fn set_maintenance(&mut self, id: TrackId, on: bool) -> Result<(), AllocationError> {
        let track = self.get_mut(id)?;
        match (on, track.status) {
            (true, TrackStatus::Occupied) => track.maintenance_pending = true,
            (true, _) => track.status = TrackStatus::Maintenance,
            (false, TrackStatus::Maintenance) => track.status = TrackStatus::Available,
            (false, _) => track.maintenance_pending = false,
        }
        Ok(())
    }

    /// Connect two tracks in both directions.
    pub fn connect(&mut self, a: TrackId, b: TrackId) -> Result<(), AllocationError> {
        self.get(b)?;
        self.get_mut(a)?.connected_tracks.insert(b);
        self.get_mut(b)?.connected_tracks.insert(a);
        Ok(())
    }

    /// Iterate tracks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Number of registered tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True when no track is registered.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
