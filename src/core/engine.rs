//! Allocation engine: the single serialization point for track/train state.
//!
//! All mutations run under one `parking_lot::Mutex`, so two concurrent `allocate`
//! calls for the same track can never both succeed and `detect` always observes a
//! consistent state. Callers that must not contend with mutators take a
//! [`EngineSnapshot`] and detect over it instead; the report's `state_version`
//! bounds how stale it is.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{DetectionTrigger, EngineConfig};
use crate::core::detector::{self, is_cycle_of, DeadlockReport};
use crate::core::{
    build_audit_event, build_graph, AgentState, AllocationError, AuditEvent, AuditSink,
    InMemoryAuditSink, Remedy, Resolution, ResolutionContext, ResolutionPolicy, ResourceRegistry,
    Track, TrackStatus, Train, TrainStatus, WaitForGraph,
};
use crate::infra::{AllocationEvent, EventBus, EventPublisher};
use crate::util::{Priority, TrackId, TrainId};

/// Ground-truth state guarded by the engine lock.
#[derive(Debug, Default)]
struct EngineState {
    registry: ResourceRegistry,
    agents: AgentState,
    version: u64,
    next_seq: u64,
}

impl EngineState {
    fn graph(&self) -> WaitForGraph {
        build_graph(self.registry.iter(), self.agents.iter())
    }
}

/// Owned copy of the engine state at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// State version the copy was taken at.
    pub version: u64,
    /// Trains in ascending id order.
    pub trains: Vec<Train>,
    /// Tracks in ascending id order.
    pub tracks: Vec<Track>,
}

impl EngineSnapshot {
    /// Wait-for graph of this snapshot.
    pub fn graph(&self) -> WaitForGraph {
        build_graph(&self.tracks, &self.trains)
    }

    /// Detect over the copy without touching the engine.
    pub fn detect(&self) -> DeadlockReport {
        detector::detect(&self.graph(), self.version)
    }
}

/// Shared-resource allocation and deadlock detection engine.
///
/// Construct once per deployment and share through an `Arc`.
pub struct AllocationEngine {
    state: Mutex<EngineState>,
    config: EngineConfig,
    policy: ResolutionPolicy,
    events: EventBus,
    trail: Mutex<InMemoryAuditSink>,
    sinks: Vec<Mutex<Box<dyn AuditSink>>>,
}

impl std::fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl Default for AllocationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AllocationEngine {
    /// Create an empty engine with the default resolution policy.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            trail: Mutex::new(InMemoryAuditSink::new(config.audit_capacity)),
            config,
            policy: ResolutionPolicy::default(),
            events: EventBus::new(),
            sinks: Vec::new(),
        }
    }

    /// Replace the resolution policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach an additional audit sink.
    #[must_use]
    pub fn with_audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sinks.push(Mutex::new(sink));
        self
    }

    /// Active configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active resolution policy.
    pub const fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Current state version; bumped by every successful mutation.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Subscribe to allocation events.
    pub fn subscribe(&self) -> Receiver<AllocationEvent> {
        self.events.subscribe()
    }

    /// Contents of the in-memory audit trail, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditEvent> {
        self.trail.lock().events()
    }

    // ------------------------------------------------------------------
    // Registration surface for the record-owning collaborator
    // ------------------------------------------------------------------

    /// Register a track. Allocation fields are reset to an unowned, empty queue and
    /// the track starts unconnected; links are added with [`Self::connect_tracks`].
    pub fn register_track(&self, mut track: Track) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        track.owner = None;
        track.request_queue.clear();
        track.maintenance_pending = false;
        track.connected_tracks.clear();
        if track.status == TrackStatus::Occupied {
            track.status = TrackStatus::Available;
        }
        let id = track.id;
        state.registry.insert(track)?;
        self.commit(&mut state, None, Some(id), "register_track", None);
        Ok(())
    }

    /// Register a train. Allocation fields are reset to empty.
    pub fn register_train(&self, mut train: Train) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        train.held_tracks.clear();
        train.pending_requests.clear();
        train.current_track = None;
        train.request_seq.clear();
        train.resolved.clear();
        let id = train.id;
        state.agents.insert(train)?;
        self.commit(&mut state, Some(id), None, "register_train", None);
        Ok(())
    }

    /// Remove an unowned track, withdrawing every queued request for it.
    pub fn remove_track(&self, id: TrackId) -> Result<Track, AllocationError> {
        let mut state = self.state.lock();
        let track = state.registry.get(id)?;
        if let Some(owner) = track.owner {
            return Err(AllocationError::InvalidState(format!(
                "{id} is held by {owner}"
            )));
        }
        let queued: Vec<TrainId> = track.request_queue.iter().copied().collect();
        for train in queued {
            state.agents.remove_pending(train, id)?;
        }
        let removed = state.registry.remove(id)?;
        state.agents.forget_track(id);
        self.commit(&mut state, None, Some(id), "remove_track", None);
        self.after_mutation(&mut state);
        Ok(removed)
    }

    /// Remove a train, releasing its tracks and withdrawing its requests.
    pub fn remove_train(&self, id: TrainId) -> Result<Train, AllocationError> {
        let mut state = self.state.lock();
        let train = state.agents.get(id)?.clone();
        for track in &train.pending_requests {
            self.withdraw(&mut state, id, *track)?;
        }
        for track in &train.held_tracks {
            self.vacate(&mut state, id, *track)?;
        }
        let removed = state.agents.remove(id)?;
        self.commit(&mut state, Some(id), None, "remove_train", None);
        self.after_mutation(&mut state);
        Ok(removed)
    }

    /// Put a track into maintenance (deferred until release if occupied) or back
    /// into service.
    pub fn set_maintenance(&self, id: TrackId, on: bool) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.registry.set_maintenance(id, on)?;
        let action = if on { "maintenance_on" } else { "maintenance_off" };
        self.commit(&mut state, None, Some(id), action, None);
        if !on {
            self.announce_head(&state, id);
        }
        self.after_mutation(&mut state);
        Ok(())
    }

    /// Connect two tracks of the network.
    pub fn connect_tracks(&self, a: TrackId, b: TrackId) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.registry.connect(a, b)?;
        self.commit(
            &mut state,
            None,
            Some(a),
            "connect",
            Some(b.to_string()),
        );
        Ok(())
    }

    /// Update a train's movement status.
    pub fn set_train_status(&self, id: TrainId, status: TrainStatus) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.agents.get_mut(id)?.status = status;
        self.commit(&mut state, Some(id), None, "status", Some(format!("{status:?}")));
        Ok(())
    }

    /// Update a train's priority.
    pub fn set_train_priority(&self, id: TrainId, priority: Priority) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.agents.get_mut(id)?.priority = priority;
        self.commit(&mut state, Some(id), None, "priority", Some(format!("{priority:?}")));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Allocation commands
    // ------------------------------------------------------------------

    /// Register interest in a track. Never blocks; granting happens in
    /// [`Self::allocate`]. Requesting a track already queued or held is a no-op.
    pub fn request(&self, train: TrainId, track: TrackId) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        let holder = state.agents.get(train)?;
        let target = state.registry.get(track)?;
        if target.owner == Some(train) || holder.is_pending(track) {
            tracing::debug!(%train, %track, "duplicate request ignored");
            return Ok(());
        }
        if self.config.enforce_connectivity && !holder.held_tracks.is_empty() {
            let reachable = holder.held_tracks.iter().any(|held| {
                state
                    .registry
                    .get(*held)
                    .is_ok_and(|h| h.connected_tracks.contains(&track))
            });
            if !reachable {
                return Err(AllocationError::InvalidState(format!(
                    "{track} is not connected to any track held by {train}"
                )));
            }
        }

        state.registry.enqueue_request(track, train)?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.agents.add_pending(train, track, seq)?;
        tracing::debug!(%train, %track, seq, "track requested");
        self.commit(&mut state, Some(train), Some(track), "request", None);
        self.announce_head(&state, track);
        self.after_mutation(&mut state);
        Ok(())
    }

    /// Grant a track to `train`.
    ///
    /// The track must be `Available` and, if anyone is queued, `train` must be first
    /// in the queue. Allocation after a racing [`Self::cancel_request`] fails with
    /// `AlreadyResolved` until the train requests the track again.
    ///
    /// Cancellation markers live outside versioned state: consuming one on a failed
    /// allocate leaves `state_version` and every snapshot unchanged.
    pub fn allocate(&self, train: TrainId, track: TrackId) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.agents.get(train)?;
        let target = state.registry.get(track)?;

        if target.owner == Some(train) {
            return Err(AllocationError::AlreadyResolved { train, track });
        }
        if state.agents.take_resolved(train, track)? {
            tracing::debug!(%train, %track, "allocate lost race against cancellation");
            return Err(AllocationError::AlreadyResolved { train, track });
        }
        let target = state.registry.get(track)?;
        if target.status == TrackStatus::Available {
            if let Some(head) = target.queue_head().filter(|head| *head != train) {
                tracing::debug!(%train, %track, %head, "allocate out of queue order");
                return Err(AllocationError::NotEligible { train, track, head });
            }
        }

        state.registry.set_owner(track, train)?;
        state.registry.dequeue_request(track, train)?;
        state.agents.remove_pending(train, track)?;
        state.agents.add_held(train, track)?;
        tracing::info!(%train, %track, "track allocated");
        self.commit(&mut state, Some(train), Some(track), "allocate", None);
        self.after_mutation(&mut state);
        Ok(())
    }

    /// Give a held track back. The track becomes `Available` (or `Maintenance` if
    /// maintenance was requested meanwhile) and its queue head is notified.
    pub fn release(&self, train: TrainId, track: TrackId) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        state.agents.get(train)?;
        let target = state.registry.get(track)?;
        if target.owner != Some(train) {
            return Err(AllocationError::InvalidState(format!(
                "{track} is not held by {train}"
            )));
        }
        self.vacate(&mut state, train, track)?;
        tracing::info!(%train, %track, "track released");
        self.commit(&mut state, Some(train), Some(track), "release", None);
        self.after_mutation(&mut state);
        Ok(())
    }

    /// Withdraw a pending request without allocating.
    ///
    /// Losing a race against [`Self::allocate`] (the track is already held) or a
    /// repeated cancel fails with `AlreadyResolved`.
    pub fn cancel_request(&self, train: TrainId, track: TrackId) -> Result<(), AllocationError> {
        let mut state = self.state.lock();
        let requester = state.agents.get(train)?;
        let target = state.registry.get(track)?;
        if !requester.is_pending(track) {
            if target.owner == Some(train) || requester.resolved.contains(&track) {
                return Err(AllocationError::AlreadyResolved { train, track });
            }
            return Err(AllocationError::InvalidState(format!(
                "{train} has no pending request for {track}"
            )));
        }
        self.withdraw(&mut state, train, track)?;
        tracing::debug!(%train, %track, "request cancelled");
        self.commit(&mut state, Some(train), Some(track), "cancel", None);
        self.after_mutation(&mut state);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Copy of one train.
    pub fn train(&self, id: TrainId) -> Result<Train, AllocationError> {
        self.state.lock().agents.get(id).cloned()
    }

    /// Copy of one track.
    pub fn track(&self, id: TrackId) -> Result<Track, AllocationError> {
        self.state.lock().registry.get(id).cloned()
    }

    /// All trains in ascending id order.
    pub fn trains(&self) -> Vec<Train> {
        self.state.lock().agents.iter().cloned().collect()
    }

    /// All tracks in ascending id order.
    pub fn tracks(&self) -> Vec<Track> {
        self.state.lock().registry.iter().cloned().collect()
    }

    /// Consistent owned copy of the whole state.
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock();
        EngineSnapshot {
            version: state.version,
            trains: state.agents.iter().cloned().collect(),
            tracks: state.registry.iter().cloned().collect(),
        }
    }

    /// Wait-for graph rebuilt from current state.
    pub fn wait_for_graph(&self) -> WaitForGraph {
        self.state.lock().graph()
    }

    /// Run a detection pass under the engine lock.
    pub fn detect(&self) -> DeadlockReport {
        let state = self.state.lock();
        detector::detect(&state.graph(), state.version)
    }

    /// Check the allocation invariants of the current state.
    pub fn check_invariants(&self) -> Result<(), String> {
        check_invariants(&self.state.lock())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Break the cycle of `report` with the configured policy.
    ///
    /// The cycle is re-validated against current state first; if it no longer
    /// exists the call fails with `StaleReport`.
    pub fn resolve(&self, report: &DeadlockReport) -> Result<Resolution, AllocationError> {
        if !report.detected {
            return Err(AllocationError::InvalidState(
                "report does not contain a deadlock".into(),
            ));
        }
        let mut state = self.state.lock();
        let resolution = self.resolve_locked(&mut state, report)?;
        self.after_mutation(&mut state);
        Ok(resolution)
    }

    /// Detect and resolve until no cycle remains. Returns the applied resolutions.
    pub fn resolve_all(&self) -> Vec<Resolution> {
        let mut state = self.state.lock();
        let resolutions = self.resolve_until_clear(&mut state);
        if self.config.verify_invariants {
            assert_invariants(&state);
        }
        resolutions
    }

    // ------------------------------------------------------------------
    // Internals (all called with the state lock held)
    // ------------------------------------------------------------------

    fn resolve_locked(
        &self,
        state: &mut EngineState,
        report: &DeadlockReport,
    ) -> Result<Resolution, AllocationError> {
        let graph = state.graph();
        if !is_cycle_of(&graph, &report.cycle) {
            return Err(AllocationError::StaleReport {
                report_version: report.state_version,
                current_version: state.version,
            });
        }
        let ctx = ResolutionContext {
            agents: &state.agents,
            graph: &graph,
        };
        let Some(resolution) = self.policy.plan(&report.cycle, ctx) else {
            return Err(AllocationError::InvalidState(format!(
                "policy produced no remedy for cycle {:?}",
                report.cycle
            )));
        };

        for remedy in &resolution.remedies {
            match *remedy {
                Remedy::Cancel { train, track } => {
                    self.withdraw(state, train, track)?;
                    self.commit(state, Some(train), Some(track), "cancel", Some("resolution".into()));
                }
                Remedy::Preempt { train, track } => {
                    self.vacate(state, train, track)?;
                    self.commit(state, Some(train), Some(track), "preempt", Some("resolution".into()));
                }
            }
        }

        assert!(
            !is_cycle_of(&state.graph(), &resolution.cycle),
            "resolution {resolution:?} left its cycle intact"
        );
        tracing::info!(
            victim = %resolution.victim,
            cycle = ?resolution.cycle,
            selector = %resolution.selector,
            action = %resolution.action,
            "deadlock resolved"
        );
        self.commit(
            state,
            Some(resolution.victim),
            None,
            "resolve",
            serde_json::to_string(&resolution.remedies).ok(),
        );
        self.events.publish(&AllocationEvent::Resolved(resolution.clone()));
        Ok(resolution)
    }

    fn resolve_until_clear(&self, state: &mut EngineState) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        // Every round removes at least one edge.
        let max_rounds = state.graph().edge_count() + 1;
        for _ in 0..max_rounds {
            let report = detector::detect(&state.graph(), state.version);
            if !report.detected {
                break;
            }
            self.publish_deadlock(state, &report);
            match self.resolve_locked(state, &report) {
                Ok(resolution) => resolutions.push(resolution),
                Err(err) => {
                    tracing::error!(%err, cycle = ?report.cycle, "resolution failed");
                    break;
                }
            }
        }
        resolutions
    }

    /// Remove a pending request from both sides and leave a cancellation marker.
    fn withdraw(
        &self,
        state: &mut EngineState,
        train: TrainId,
        track: TrackId,
    ) -> Result<(), AllocationError> {
        let was_head = state.registry.get(track)?.queue_head() == Some(train);
        state.registry.dequeue_request(track, train)?;
        state.agents.remove_pending(train, track)?;
        state.agents.mark_resolved(train, track)?;
        if was_head {
            self.announce_head(state, track);
        }
        Ok(())
    }

    /// Clear ownership on both sides and announce the next eligible train.
    fn vacate(
        &self,
        state: &mut EngineState,
        train: TrainId,
        track: TrackId,
    ) -> Result<(), AllocationError> {
        state.registry.clear_owner(track)?;
        state.agents.remove_held(train, track)?;
        self.announce_head(state, track);
        Ok(())
    }

    fn announce_head(&self, state: &EngineState, track: TrackId) {
        let Ok(target) = state.registry.get(track) else {
            return;
        };
        if target.status != TrackStatus::Available {
            return;
        }
        if let Some(head) = target.queue_head() {
            tracing::debug!(train = %head, %track, "train eligible");
            self.events
                .publish(&AllocationEvent::Eligible { train: head, track });
        }
    }

    fn publish_deadlock(&self, state: &EngineState, report: &DeadlockReport) {
        self.record(build_audit_event(
            report.cycle.first().copied(),
            None,
            "deadlock",
            state.version,
            Some(format!("{:?}", report.cycle)),
        ));
        self.events
            .publish(&AllocationEvent::DeadlockDetected(report.clone()));
    }

    fn commit(
        &self,
        state: &mut EngineState,
        train: Option<TrainId>,
        track: Option<TrackId>,
        action: &str,
        payload: Option<String>,
    ) {
        state.version += 1;
        self.record(build_audit_event(train, track, action, state.version, payload));
    }

    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.lock().record(event.clone());
        }
        self.trail.lock().record(event);
    }

    fn after_mutation(&self, state: &mut EngineState) {
        if self.config.verify_invariants {
            assert_invariants(state);
        }
        if self.config.detection != DetectionTrigger::PerMutation {
            return;
        }
        if self.config.auto_resolve {
            self.resolve_until_clear(state);
            if self.config.verify_invariants {
                assert_invariants(state);
            }
            return;
        }
        let report = detector::detect(&state.graph(), state.version);
        if report.detected {
            self.publish_deadlock(state, &report);
        }
    }
}

fn assert_invariants(state: &EngineState) {
    if let Err(violation) = check_invariants(state) {
        panic!("allocation state corrupted at version {}: {violation}", state.version);
    }
}

fn check_invariants(state: &EngineState) -> Result<(), String> {
    for track in state.registry.iter() {
        let occupied = track.status == TrackStatus::Occupied;
        if occupied != track.owner.is_some() {
            return Err(format!(
                "{} has status {:?} but owner {:?}",
                track.id, track.status, track.owner
            ));
        }
        if let Some(owner) = track.owner {
            let train = state.agents.get(owner).map_err(|e| e.to_string())?;
            if !train.held_tracks.contains(&track.id) {
                return Err(format!("{} owned by {owner} which does not hold it", track.id));
            }
            if track.request_queue.contains(&owner) {
                return Err(format!("{} queue contains its owner {owner}", track.id));
            }
        }
        for (i, queued) in track.request_queue.iter().enumerate() {
            if track.request_queue.iter().skip(i + 1).any(|q| q == queued) {
                return Err(format!("{} queue holds {queued} twice", track.id));
            }
            let train = state.agents.get(*queued).map_err(|e| e.to_string())?;
            if !train.is_pending(track.id) {
                return Err(format!("{queued} queued on {} without pending request", track.id));
            }
        }
    }
    for train in state.agents.iter() {
        for held in &train.held_tracks {
            let track = state.registry.get(*held).map_err(|e| e.to_string())?;
            if track.owner != Some(train.id) {
                return Err(format!("{} holds {held} owned by {:?}", train.id, track.owner));
            }
            if train.is_pending(*held) {
                return Err(format!("{} both holds and requests {held}", train.id));
            }
        }
        for pending in &train.pending_requests {
            let track = state.registry.get(*pending).map_err(|e| e.to_string())?;
            if !track.request_queue.contains(&train.id) {
                return Err(format!("{} pending on {pending} but not queued", train.id));
            }
        }
    }
    Ok(())
}
