//! Tests for utility types

use track_arbiter::util::{now_ms, Priority, TrackId, TrainId};

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_id_display() {
    assert_eq!(TrainId(12).to_string(), "train-12");
    assert_eq!(TrackId(3).to_string(), "track-3");
}

#[test]
fn test_ids_serialize_transparently() {
    assert_eq!(serde_json::to_string(&TrainId(5)).unwrap(), "5");
    let id: TrackId = serde_json::from_str("9").unwrap();
    assert_eq!(id, TrackId::from(9));
}

#[test]
fn test_clock_is_monotone_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}
