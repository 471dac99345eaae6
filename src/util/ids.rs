//! Identifier and metadata types shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a train (agent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub u64);

/// Identifier of a track segment (resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "train-{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

impl From<u64> for TrainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for TrackId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Train priority used by priority-aware victim selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest priority; first to be sacrificed.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Elevated priority.
    High,
    /// Never chosen while a lower-priority train shares the cycle.
    Critical,
}
