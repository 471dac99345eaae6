//! Error types for allocation operations.

use thiserror::Error;

use crate::util::{TrackId, TrainId};

/// Which kind of record a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A train record.
    Train,
    /// A track record.
    Track,
}

/// Recoverable errors returned by the allocation engine.
///
/// Contention is normal traffic: every variant is a refusal, never a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Unknown train or track id.
    #[error("{kind:?} {id} not found")]
    NotFound {
        /// Record kind that was looked up.
        kind: RecordKind,
        /// Raw identifier.
        id: u64,
    },
    /// Track is under maintenance or owned by another train.
    #[error("{track} unavailable: {reason}")]
    ResourceUnavailable {
        /// Contested track.
        track: TrackId,
        /// Why the track cannot be granted.
        reason: String,
    },
    /// Allocation attempted out of queue order.
    #[error("{train} not eligible for {track}: {head} is first in queue")]
    NotEligible {
        /// Caller.
        train: TrainId,
        /// Requested track.
        track: TrackId,
        /// Train at the head of the request queue.
        head: TrainId,
    },
    /// A racing cancel/allocate (or a stale resolution) already settled this request.
    #[error("request of {train} for {track} already resolved")]
    AlreadyResolved {
        /// Caller.
        train: TrainId,
        /// Track of the settled request.
        track: TrackId,
    },
    /// A deadlock report no longer matches current state.
    #[error("stale report from version {report_version} (current {current_version})")]
    StaleReport {
        /// Version the report observed.
        report_version: u64,
        /// Version at resolution time.
        current_version: u64,
    },
    /// Operation does not apply to the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Configuration rejected during validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl AllocationError {
    /// Unknown train.
    pub const fn train_not_found(id: TrainId) -> Self {
        Self::NotFound {
            kind: RecordKind::Train,
            id: id.0,
        }
    }

    /// Unknown track.
    pub const fn track_not_found(id: TrackId) -> Self {
        Self::NotFound {
            kind: RecordKind::Track,
            id: id.0,
        }
    }

    /// Stable machine-readable kind name.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ResourceUnavailable { .. } => "resource_unavailable",
            Self::NotEligible { .. } => "not_eligible",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::StaleReport { .. } => "stale_report",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Track refused with a reason.
    pub fn unavailable(track: TrackId, reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            track,
            reason: reason.into(),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
