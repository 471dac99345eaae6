//! Integration tests for allocation commands, detection and resolution.
//!
//! This test validates:
//! 1. Queue discipline (FIFO fairness) and maintenance handling
//! 2. Cancel/allocate race outcomes
//! 3. Detection scenarios (ring, chain, minimal cycle slice)
//! 4. Resolution liveness for every selector/action pair
//! 5. Event notification and per-mutation detection

use std::time::Duration;

use track_arbiter::builders::build_engine;
use track_arbiter::config::{ActionPolicy, DetectionTrigger, EngineConfig, VictimPolicy};
use track_arbiter::core::{
    AllocationEngine, AllocationError, Remedy, Track, TrackStatus, Train, TrainStatus,
};
use track_arbiter::infra::AllocationEvent;
use track_arbiter::util::{Priority, TrackId, TrainId};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn engine_with(trains: u64, tracks: u64, cfg: EngineConfig) -> AllocationEngine {
    let engine = build_engine(&cfg).unwrap();
    for i in 1..=trains {
        engine
            .register_train(Train::new(TrainId(i), format!("IC {i}")))
            .unwrap();
    }
    for i in 1..=tracks {
        engine
            .register_track(Track::new(TrackId(i), format!("Segment {i}")))
            .unwrap();
    }
    engine
}

fn engine(trains: u64, tracks: u64) -> AllocationEngine {
    engine_with(trains, tracks, EngineConfig::default())
}

/// Trains 1..=n each hold track i and request track i % n + 1.
fn ring(engine: &AllocationEngine, n: u64) {
    for i in 1..=n {
        engine.allocate(TrainId(i), TrackId(i)).unwrap();
    }
    for i in 1..=n {
        engine.request(TrainId(i), TrackId(i % n + 1)).unwrap();
    }
}

fn ids(raw: &[u64]) -> Vec<TrainId> {
    raw.iter().map(|r| TrainId(*r)).collect()
}

// ============================================================================
// QUEUE DISCIPLINE
// ============================================================================

#[test]
fn test_fifo_fairness() {
    let engine = engine(3, 1);
    engine.allocate(TrainId(3), TrackId(1)).unwrap();
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    engine.release(TrainId(3), TrackId(1)).unwrap();

    assert!(matches!(
        engine.allocate(TrainId(2), TrackId(1)),
        Err(AllocationError::NotEligible { head, .. }) if head == TrainId(1)
    ));
    engine.allocate(TrainId(1), TrackId(1)).unwrap();

    let track = engine.track(TrackId(1)).unwrap();
    assert_eq!(track.owner, Some(TrainId(1)));
    assert_eq!(track.status, TrackStatus::Occupied);
    assert_eq!(track.request_queue, [TrainId(2)]);

    let train = engine.train(TrainId(1)).unwrap();
    assert!(train.pending_requests.is_empty());
    assert!(train.held_tracks.contains(&TrackId(1)));
    assert_eq!(train.current_track, Some(TrackId(1)));
}

#[test]
fn test_unqueued_train_cannot_jump_queue() {
    let engine = engine(2, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    assert!(matches!(
        engine.allocate(TrainId(2), TrackId(1)),
        Err(AllocationError::NotEligible { .. })
    ));
}

#[test]
fn test_allocate_occupied_track_is_unavailable() {
    let engine = engine(2, 1);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    assert!(matches!(
        engine.allocate(TrainId(2), TrackId(1)),
        Err(AllocationError::ResourceUnavailable { .. })
    ));
}

#[test]
fn test_request_is_idempotent() {
    let engine = engine(2, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    let version = engine.version();
    engine.request(TrainId(1), TrackId(1)).unwrap();
    assert_eq!(engine.version(), version);
    assert_eq!(engine.track(TrackId(1)).unwrap().request_queue, [TrainId(1)]);

    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(1), TrackId(1)).unwrap();
    assert!(engine.train(TrainId(1)).unwrap().pending_requests.is_empty());
}

#[test]
fn test_unknown_ids() {
    let engine = engine(1, 1);
    assert_eq!(
        engine.request(TrainId(9), TrackId(1)),
        Err(AllocationError::train_not_found(TrainId(9)))
    );
    assert_eq!(
        engine.allocate(TrainId(1), TrackId(9)),
        Err(AllocationError::track_not_found(TrackId(9)))
    );
}

#[test]
fn test_release_by_non_owner_is_invalid() {
    let engine = engine(2, 1);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    assert!(matches!(
        engine.release(TrainId(2), TrackId(1)),
        Err(AllocationError::InvalidState(_))
    ));
    assert_eq!(engine.track(TrackId(1)).unwrap().owner, Some(TrainId(1)));
}

// ============================================================================
// MAINTENANCE
// ============================================================================

#[test]
fn test_allocate_on_maintenance_always_unavailable() {
    let engine = engine(2, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.set_maintenance(TrackId(1), true).unwrap();

    // Head of queue and an outsider are both refused.
    assert!(matches!(
        engine.allocate(TrainId(1), TrackId(1)),
        Err(AllocationError::ResourceUnavailable { .. })
    ));
    assert!(matches!(
        engine.allocate(TrainId(2), TrackId(1)),
        Err(AllocationError::ResourceUnavailable { .. })
    ));
    assert!(matches!(
        engine.request(TrainId(2), TrackId(1)),
        Err(AllocationError::ResourceUnavailable { .. })
    ));

    engine.set_maintenance(TrackId(1), false).unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
}

#[test]
fn test_maintenance_deferred_until_release() {
    let engine = engine(1, 1);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.set_maintenance(TrackId(1), true).unwrap();
    assert_eq!(engine.track(TrackId(1)).unwrap().status, TrackStatus::Occupied);

    engine.release(TrainId(1), TrackId(1)).unwrap();
    let track = engine.track(TrackId(1)).unwrap();
    assert_eq!(track.status, TrackStatus::Maintenance);
    assert_eq!(track.owner, None);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn test_cancel_then_allocate_loses() {
    let engine = engine(1, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.cancel_request(TrainId(1), TrackId(1)).unwrap();

    assert_eq!(
        engine.allocate(TrainId(1), TrackId(1)),
        Err(AllocationError::AlreadyResolved {
            train: TrainId(1),
            track: TrackId(1)
        })
    );
    assert!(engine.track(TrackId(1)).unwrap().request_queue.is_empty());

    // Re-requesting revives the claim.
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
}

#[test]
fn test_allocate_then_cancel_loses() {
    let engine = engine(1, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    assert!(matches!(
        engine.cancel_request(TrainId(1), TrackId(1)),
        Err(AllocationError::AlreadyResolved { .. })
    ));
    assert!(matches!(
        engine.allocate(TrainId(1), TrackId(1)),
        Err(AllocationError::AlreadyResolved { .. })
    ));
}

#[test]
fn test_cancel_without_request_is_invalid() {
    let engine = engine(1, 1);
    assert!(matches!(
        engine.cancel_request(TrainId(1), TrackId(1)),
        Err(AllocationError::InvalidState(_))
    ));
}

#[test]
fn test_cancel_head_promotes_next() {
    let engine = engine(2, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    engine.cancel_request(TrainId(1), TrackId(1)).unwrap();
    engine.allocate(TrainId(2), TrackId(1)).unwrap();
}

// ============================================================================
// DETECTION
// ============================================================================

#[test]
fn test_ring_of_three_deadlocks() {
    let engine = engine(3, 3);
    ring(&engine, 3);

    let report = engine.detect();
    assert!(report.detected);
    assert_eq!(report.normalized_cycle(), ids(&[1, 2, 3]));
    assert_eq!(report.state_version, engine.version());
}

#[test]
fn test_chain_is_not_deadlock() {
    let engine = engine(2, 2);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.allocate(TrainId(2), TrackId(2)).unwrap();
    engine.request(TrainId(1), TrackId(2)).unwrap();

    let report = engine.detect();
    assert!(!report.detected);
    assert!(report.cycle.is_empty());
}

#[test]
fn test_cycle_report_excludes_waiting_tail() {
    // 1 waits on 2, and 2 <-> 3 deadlock.
    let engine = engine(3, 3);
    for i in 1..=3 {
        engine.allocate(TrainId(i), TrackId(i)).unwrap();
    }
    engine.request(TrainId(1), TrackId(2)).unwrap();
    engine.request(TrainId(2), TrackId(3)).unwrap();
    engine.request(TrainId(3), TrackId(2)).unwrap();

    let report = engine.detect();
    assert_eq!(report.normalized_cycle(), ids(&[2, 3]));
}

#[test]
fn test_graph_rebuild_is_deterministic() {
    let engine = engine(3, 3);
    ring(&engine, 3);
    assert_eq!(engine.wait_for_graph(), engine.wait_for_graph());
    assert_eq!(engine.wait_for_graph().edge_count(), 3);
}

#[test]
fn test_release_breaks_cycle() {
    let engine = engine(2, 2);
    ring(&engine, 2);
    assert!(engine.detect().detected);
    engine.release(TrainId(2), TrackId(2)).unwrap();
    assert!(!engine.detect().detected);
}

#[test]
fn test_snapshot_detection_reports_its_version() {
    let engine = engine(2, 2);
    ring(&engine, 2);
    let snapshot = engine.snapshot();
    engine.release(TrainId(1), TrackId(1)).unwrap();

    let stale = snapshot.detect();
    assert!(stale.detected);
    assert!(engine.version() > stale.state_version);
    assert!(!engine.detect().detected);
    assert!(matches!(
        engine.resolve(&stale),
        Err(AllocationError::StaleReport { .. })
    ));
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[test]
fn test_default_resolution_cancels_smallest_id_request() {
    let engine = engine(3, 3);
    ring(&engine, 3);
    let report = engine.detect();
    let resolution = engine.resolve(&report).unwrap();

    assert_eq!(resolution.victim, TrainId(1));
    assert_eq!(
        resolution.remedies,
        vec![Remedy::Cancel {
            train: TrainId(1),
            track: TrackId(2)
        }]
    );
    assert!(!engine.detect().same_cycle(&report.cycle));
    assert!(engine.train(TrainId(1)).unwrap().pending_requests.is_empty());
    engine.check_invariants().unwrap();
}

#[test]
fn test_liveness_for_every_strategy() {
    let victims = [
        VictimPolicy::SmallestId,
        VictimPolicy::LowestPriority,
        VictimPolicy::YoungestRequest,
        VictimPolicy::FewestHeld,
    ];
    let actions = [ActionPolicy::CancelRequest, ActionPolicy::PreemptHolder];
    for victim in victims {
        for action in actions {
            let cfg = EngineConfig {
                victim,
                action,
                ..EngineConfig::default()
            };
            let engine = engine_with(4, 4, cfg);
            ring(&engine, 4);
            let report = engine.detect();
            engine.resolve(&report).unwrap();
            let after = engine.detect();
            assert!(
                !after.same_cycle(&report.cycle),
                "{victim:?}/{action:?} left the cycle in place"
            );
            engine.check_invariants().unwrap();
        }
    }
}

#[test]
fn test_lowest_priority_victim_is_preempted() {
    let cfg = EngineConfig {
        victim: VictimPolicy::LowestPriority,
        action: ActionPolicy::PreemptHolder,
        ..EngineConfig::default()
    };
    let engine = engine_with(3, 3, cfg);
    engine.set_train_priority(TrainId(1), Priority::Critical).unwrap();
    engine.set_train_priority(TrainId(3), Priority::Low).unwrap();
    ring(&engine, 3);

    let resolution = engine.resolve(&engine.detect()).unwrap();
    assert_eq!(resolution.victim, TrainId(3));
    // Train 2 was waiting on track 3 held by the victim.
    assert_eq!(
        resolution.remedies,
        vec![Remedy::Preempt {
            train: TrainId(3),
            track: TrackId(3)
        }]
    );
    let track = engine.track(TrackId(3)).unwrap();
    assert_eq!(track.owner, None);
    assert_eq!(track.request_queue, [TrainId(2)]);
    engine.allocate(TrainId(2), TrackId(3)).unwrap();
}

#[test]
fn test_resolve_all_clears_independent_cycles() {
    let engine = engine(4, 4);
    for i in 1..=4 {
        engine.allocate(TrainId(i), TrackId(i)).unwrap();
    }
    engine.request(TrainId(1), TrackId(2)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    engine.request(TrainId(3), TrackId(4)).unwrap();
    engine.request(TrainId(4), TrackId(3)).unwrap();

    let resolutions = engine.resolve_all();
    assert_eq!(resolutions.len(), 2);
    assert!(!engine.detect().detected);
}

#[test]
fn test_resolve_clear_report_is_invalid() {
    let engine = engine(1, 1);
    let report = engine.detect();
    assert!(matches!(
        engine.resolve(&report),
        Err(AllocationError::InvalidState(_))
    ));
}

// ============================================================================
// EVENTS AND TRIGGERS
// ============================================================================

#[test]
fn test_release_notifies_queue_head() {
    let engine = engine(3, 1);
    let events = engine.subscribe();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    engine.request(TrainId(3), TrackId(1)).unwrap();
    assert!(events.try_recv().is_err());

    engine.release(TrainId(1), TrackId(1)).unwrap();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(1)).unwrap(),
        AllocationEvent::Eligible {
            train: TrainId(2),
            track: TrackId(1)
        }
    );
}

#[test]
fn test_request_on_free_track_notifies_requester() {
    let engine = engine(1, 1);
    let events = engine.subscribe();
    engine.request(TrainId(1), TrackId(1)).unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        AllocationEvent::Eligible {
            train: TrainId(1),
            track: TrackId(1)
        }
    );
}

#[test]
fn test_per_mutation_detection_publishes_deadlock() {
    let cfg = EngineConfig {
        detection: DetectionTrigger::PerMutation,
        ..EngineConfig::default()
    };
    let engine = engine_with(2, 2, cfg);
    let events = engine.subscribe();
    ring(&engine, 2);

    let detected: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e {
            AllocationEvent::DeadlockDetected(report) => Some(report),
            _ => None,
        })
        .collect();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].normalized_cycle(), ids(&[1, 2]));
    // Without auto_resolve the deadlock stays in place.
    assert!(engine.detect().detected);
}

#[test]
fn test_auto_resolve_keeps_state_deadlock_free() {
    let cfg = EngineConfig {
        detection: DetectionTrigger::PerMutation,
        auto_resolve: true,
        ..EngineConfig::default()
    };
    let engine = engine_with(3, 3, cfg);
    let events = engine.subscribe();
    ring(&engine, 3);

    assert!(!engine.detect().detected);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, AllocationEvent::Resolved(r) if r.victim == TrainId(1))));
    assert!(engine
        .audit_trail()
        .iter()
        .any(|e| e.action == "resolve"));
}

// ============================================================================
// RECORD MANAGEMENT
// ============================================================================

#[test]
fn test_remove_train_frees_everything() {
    let engine = engine(2, 2);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(1), TrackId(2)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();

    let removed = engine.remove_train(TrainId(1)).unwrap();
    assert_eq!(removed.id, TrainId(1));
    assert_eq!(engine.track(TrackId(1)).unwrap().owner, None);
    assert!(engine.track(TrackId(2)).unwrap().request_queue.is_empty());
    engine.allocate(TrainId(2), TrackId(1)).unwrap();
    engine.check_invariants().unwrap();
}

#[test]
fn test_remove_owned_track_refused() {
    let engine = engine(2, 1);
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    assert!(engine.remove_track(TrackId(1)).is_err());
    engine.release(TrainId(1), TrackId(1)).unwrap();
    engine.request(TrainId(2), TrackId(1)).unwrap();
    engine.remove_track(TrackId(1)).unwrap();
    assert!(engine.train(TrainId(2)).unwrap().pending_requests.is_empty());
}

#[test]
fn test_connectivity_constraint() {
    let cfg = EngineConfig {
        enforce_connectivity: true,
        ..EngineConfig::default()
    };
    let engine = engine_with(1, 3, cfg);
    engine.connect_tracks(TrackId(1), TrackId(2)).unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();

    engine.request(TrainId(1), TrackId(2)).unwrap();
    assert!(matches!(
        engine.request(TrainId(1), TrackId(3)),
        Err(AllocationError::InvalidState(_))
    ));
}

#[test]
fn test_reregistered_track_starts_unconnected() {
    let cfg = EngineConfig {
        enforce_connectivity: true,
        ..EngineConfig::default()
    };
    let engine = engine_with(1, 2, cfg);
    engine.connect_tracks(TrackId(1), TrackId(2)).unwrap();
    engine.remove_track(TrackId(2)).unwrap();
    assert!(engine.track(TrackId(1)).unwrap().connected_tracks.is_empty());

    engine
        .register_track(Track::new(TrackId(2), "Segment 2 (new)"))
        .unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    assert!(matches!(
        engine.request(TrainId(1), TrackId(2)),
        Err(AllocationError::InvalidState(_))
    ));
}

#[test]
fn test_register_track_ignores_caller_adjacency() {
    let cfg = EngineConfig {
        enforce_connectivity: true,
        ..EngineConfig::default()
    };
    let engine = engine_with(1, 1, cfg);
    let mut track = Track::new(TrackId(2), "Segment 2");
    track.connected_tracks.insert(TrackId(1));
    track.connected_tracks.insert(TrackId(99));
    engine.register_track(track).unwrap();
    assert!(engine.track(TrackId(2)).unwrap().connected_tracks.is_empty());

    engine.allocate(TrainId(1), TrackId(2)).unwrap();
    assert!(matches!(
        engine.request(TrainId(1), TrackId(1)),
        Err(AllocationError::InvalidState(_))
    ));
}

#[test]
fn test_reregistered_track_has_no_cancel_marker() {
    let engine = engine(1, 3);
    engine.request(TrainId(1), TrackId(3)).unwrap();
    engine.cancel_request(TrainId(1), TrackId(3)).unwrap();
    engine.remove_track(TrackId(3)).unwrap();

    engine
        .register_track(Track::new(TrackId(3), "Segment 3 (new)"))
        .unwrap();
    engine.allocate(TrainId(1), TrackId(3)).unwrap();
    assert_eq!(engine.track(TrackId(3)).unwrap().owner, Some(TrainId(1)));
}

#[test]
fn test_lost_race_does_not_bump_version() {
    let engine = engine(1, 1);
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.cancel_request(TrainId(1), TrackId(1)).unwrap();
    let version = engine.version();

    assert!(matches!(
        engine.allocate(TrainId(1), TrackId(1)),
        Err(AllocationError::AlreadyResolved { .. })
    ));
    assert_eq!(engine.version(), version);
    // The marker is bookkeeping outside versioned state: snapshots agree.
    assert_eq!(engine.snapshot().version, version);
}

#[test]
fn test_snapshot_survives_serde_round_trip() {
    let engine = engine(2, 2);
    ring(&engine, 2);
    engine.cancel_request(TrainId(1), TrackId(2)).unwrap();
    let snapshot = engine.snapshot();

    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: track_arbiter::core::EngineSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, snapshot);
    assert_eq!(restored.detect().cycle, snapshot.detect().cycle);
}

#[test]
fn test_train_status_is_external() {
    let engine = engine(1, 0);
    engine.set_train_status(TrainId(1), TrainStatus::Moving).unwrap();
    assert_eq!(engine.train(TrainId(1)).unwrap().status, TrainStatus::Moving);
}
