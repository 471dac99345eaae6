//! Tests for audit sinks

use std::sync::Arc;

use parking_lot::Mutex;

use track_arbiter::core::{
    build_audit_event, AllocationEngine, AuditEvent, AuditSink, InMemoryAuditSink, Track,
    TracingAuditSink, Train,
};
use track_arbiter::util::{TrackId, TrainId};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        Some(TrainId(1)),
        Some(TrackId(2)),
        "request",
        5,
        Some("payload".to_string()),
    );

    sink.record(event.clone());
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], event);
    assert_eq!(events[0].action, "request");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(None, None, "a", 1, None));
    sink.record(build_audit_event(None, None, "b", 2, None));
    sink.record(build_audit_event(None, None, "c", 3, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "b"); // First one popped
    assert_eq!(events[1].action, "c");
}

#[test]
fn test_zero_capacity_sink_stores_nothing() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(None, None, "a", 1, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let a = build_audit_event(Some(TrainId(1)), None, "release", 7, None);
    let b = build_audit_event(Some(TrainId(1)), None, "release", 7, None);

    assert_eq!(a.train, Some(TrainId(1)));
    assert_eq!(a.track, None);
    assert_eq!(a.state_version, 7);
    assert!(a.created_at_ms > 0);
    assert_ne!(a.event_id, b.event_id);
}

/// Sink sharing its buffer with the test.
struct SharedSink(Arc<Mutex<Vec<AuditEvent>>>);

impl AuditSink for SharedSink {
    fn record(&mut self, event: AuditEvent) {
        self.0.lock().push(event);
    }
}

#[test]
fn test_attached_sink_receives_every_commit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let engine = AllocationEngine::default()
        .with_audit(Box::new(SharedSink(Arc::clone(&seen))))
        .with_audit(Box::new(TracingAuditSink));

    engine.register_train(Train::new(TrainId(1), "IC 1")).unwrap();
    engine.register_track(Track::new(TrackId(1), "North")).unwrap();
    engine.request(TrainId(1), TrackId(1)).unwrap();
    engine.allocate(TrainId(1), TrackId(1)).unwrap();
    engine.release(TrainId(1), TrackId(1)).unwrap();
    assert!(engine.release(TrainId(1), TrackId(1)).is_err());

    let seen = seen.lock();
    let actions: Vec<&str> = seen.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        ["register_train", "register_track", "request", "allocate", "release"]
    );
    assert_eq!(*seen, engine.audit_trail());
    assert_eq!(seen.last().unwrap().state_version, engine.version());
}
