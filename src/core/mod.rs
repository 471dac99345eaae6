//! Allocation state, wait-for graph derivation, cycle detection and resolution.

pub mod agents;
pub mod audit;
pub mod detector;
pub mod engine;
pub mod error;
pub mod graph;
pub mod registry;
pub mod resolution;

pub use agents::{AgentState, Train, TrainStatus};
pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use detector::{find_cycle, normalize_cycle, DeadlockReport};
pub use engine::{AllocationEngine, EngineSnapshot};
pub use error::{AllocationError, AppResult, RecordKind};
pub use graph::{build_graph, WaitForEdge, WaitForGraph};
pub use registry::{ResourceRegistry, Track, TrackStatus};
pub use resolution::{
    CancelRequest, FewestHeld, LowestPriority, PreemptHolder, Remedy, Resolution,
    ResolutionAction, ResolutionContext, ResolutionPolicy, SmallestId, VictimSelector,
    YoungestRequest,
};
