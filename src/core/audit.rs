//! Audit trail of allocation commands and resolutions.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::{TrackId, TrainId};

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier (v4 uuid).
    pub event_id: String,
    /// Train involved, if any.
    pub train: Option<TrainId>,
    /// Track involved, if any.
    pub track: Option<TrackId>,
    /// Action taken (request, allocate, release, cancel, preempt, deadlock, resolve, ...).
    pub action: String,
    /// State version after the action.
    pub state_version: u64,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::debug!(
            event_id = %event.event_id,
            train = ?event.train,
            track = ?event.track,
            action = %event.action,
            state_version = event.state_version,
            payload = ?event.payload,
            "audit"
        );
    }
}

/// Helper to build an audit event with a fresh id and timestamp.
pub fn build_audit_event(
    train: Option<TrainId>,
    track: Option<TrackId>,
    action: impl Into<String>,
    state_version: u64,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        train,
        track,
        action: action.into(),
        state_version,
        created_at_ms: now_ms(),
        payload,
    }
}
