//! Tests for error types

use track_arbiter::core::AllocationError;
use track_arbiter::util::{TrackId, TrainId};

#[test]
fn test_not_found_error() {
    let err = AllocationError::train_not_found(TrainId(4));
    assert_eq!(format!("{}", err), "Train 4 not found");
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn test_not_eligible_error() {
    let err = AllocationError::NotEligible {
        train: TrainId(2),
        track: TrackId(9),
        head: TrainId(1),
    };
    assert_eq!(
        format!("{}", err),
        "train-2 not eligible for track-9: train-1 is first in queue"
    );
}

#[test]
fn test_unavailable_error() {
    let err = AllocationError::unavailable(TrackId(3), "under maintenance");
    assert_eq!(format!("{}", err), "track-3 unavailable: under maintenance");
    assert_eq!(err.kind(), "resource_unavailable");
}

#[test]
fn test_already_resolved_error() {
    let err = AllocationError::AlreadyResolved {
        train: TrainId(1),
        track: TrackId(2),
    };
    assert_eq!(
        format!("{}", err),
        "request of train-1 for track-2 already resolved"
    );
}

#[test]
fn test_stale_report_error() {
    let err = AllocationError::StaleReport {
        report_version: 3,
        current_version: 8,
    };
    assert_eq!(format!("{}", err), "stale report from version 3 (current 8)");
}
