//! API-facing request/response models.
//!
//! Transport is left to the service layer; these types only fix the shape of the
//! commands and queries and are serde-serializable for that purpose.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::{AllocationEngine, AllocationError, Track, TrackStatus, Train, TrainStatus};
use crate::util::{TrackId, TrainId};

/// Allocation command, tagged by `op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Queue a request.
    Request {
        /// Requesting train.
        train_id: TrainId,
        /// Requested track.
        track_id: TrackId,
    },
    /// Grant a track.
    Allocate {
        /// Claiming train.
        train_id: TrainId,
        /// Claimed track.
        track_id: TrackId,
    },
    /// Give a track back.
    Release {
        /// Holding train.
        train_id: TrainId,
        /// Held track.
        track_id: TrackId,
    },
    /// Withdraw a pending request.
    CancelRequest {
        /// Requesting train.
        train_id: TrainId,
        /// Requested track.
        track_id: TrackId,
    },
}

/// Result of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command was applied.
    pub ok: bool,
    /// Error kind (`not_found`, `not_eligible`, ...) when refused.
    pub error_kind: Option<String>,
    /// Human-readable reason when refused.
    pub error: Option<String>,
    /// State version after the command.
    pub version: u64,
}

/// Train as exposed to queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainView {
    /// Train identifier.
    pub id: TrainId,
    /// Movement status.
    pub status: TrainStatus,
    /// Held tracks.
    pub held_tracks: BTreeSet<TrackId>,
    /// Pending requests in request order.
    pub pending_requests: Vec<TrackId>,
}

/// Track as exposed to queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackView {
    /// Track identifier.
    pub id: TrackId,
    /// Status.
    pub status: TrackStatus,
    /// Owner, if occupied.
    pub owner: Option<TrainId>,
    /// Requesting trains in arrival order.
    pub request_queue: Vec<TrainId>,
}

/// Detection query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Whether a deadlock exists.
    pub detected: bool,
    /// Cycle members in wait order.
    pub cycle: Vec<TrainId>,
    /// Detection time, ms since epoch.
    pub timestamp: u128,
    /// State version observed.
    pub state_version: u64,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Current state version.
    pub version: u64,
}

impl From<&Train> for TrainView {
    fn from(train: &Train) -> Self {
        Self {
            id: train.id,
            status: train.status,
            held_tracks: train.held_tracks.clone(),
            pending_requests: train.pending_requests.clone(),
        }
    }
}

impl From<&Track> for TrackView {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            status: track.status,
            owner: track.owner,
            request_queue: track.request_queue.iter().copied().collect(),
        }
    }
}

/// Apply a command and describe the outcome.
pub fn execute(engine: &AllocationEngine, command: Command) -> CommandResponse {
    let result: Result<(), AllocationError> = match command {
        Command::Request { train_id, track_id } => engine.request(train_id, track_id),
        Command::Allocate { train_id, track_id } => engine.allocate(train_id, track_id),
        Command::Release { train_id, track_id } => engine.release(train_id, track_id),
        Command::CancelRequest { train_id, track_id } => engine.cancel_request(train_id, track_id),
    };
    let version = engine.version();
    match result {
        Ok(()) => CommandResponse {
            ok: true,
            error_kind: None,
            error: None,
            version,
        },
        Err(err) => CommandResponse {
            ok: false,
            error_kind: Some(err.kind().to_string()),
            error: Some(err.to_string()),
            version,
        },
    }
}

/// All trains.
pub fn list_trains(engine: &AllocationEngine) -> Vec<TrainView> {
    engine.trains().iter().map(TrainView::from).collect()
}

/// All tracks.
pub fn list_tracks(engine: &AllocationEngine) -> Vec<TrackView> {
    engine.tracks().iter().map(TrackView::from).collect()
}

/// Run a detection pass.
pub fn detect(engine: &AllocationEngine) -> DetectResponse {
    let report = engine.detect();
    DetectResponse {
        detected: report.detected,
        cycle: report.cycle,
        timestamp: report.timestamp_ms,
        state_version: report.state_version,
    }
}

/// Return a health payload.
pub fn health(engine: &AllocationEngine) -> Health {
    Health {
        ok: engine.check_invariants().is_ok(),
        version: engine.version(),
    }
}
