//! # Track Arbiter
//!
//! Exclusive track allocation and deadlock detection for a fleet of trains.
//!
//! Trains compete for track segments that only one train may own at a time. The
//! engine keeps the authoritative ownership and request-queue state, derives a
//! wait-for graph (train → train) from it on demand, detects circular waits and
//! breaks them with a pluggable resolution policy.
//!
//! ## Key Properties
//!
//! - **Serialized state**: every mutation runs under one lock; two concurrent
//!   `allocate` calls for the same track never both succeed
//! - **FIFO fairness**: a track is granted to the head of its request queue
//! - **Derived graph**: the wait-for graph is rebuilt from ground truth for every
//!   detection pass and can never drift from it
//! - **Sound, complete detection**: per-root recursion stacks, minimal cycle slices
//! - **Guaranteed progress**: applying a resolution always breaks the reported cycle
//!
//! ## Example
//!
//! ```rust
//! use track_arbiter::core::{AllocationEngine, Track, Train};
//! use track_arbiter::util::{TrackId, TrainId};
//!
//! let engine = AllocationEngine::default();
//! for i in 1..=2 {
//!     engine.register_train(Train::new(TrainId(i), format!("IC {i}"))).unwrap();
//!     engine.register_track(Track::new(TrackId(i), format!("Segment {i}"))).unwrap();
//!     engine.allocate(TrainId(i), TrackId(i)).unwrap();
//! }
//! engine.request(TrainId(1), TrackId(2)).unwrap();
//! engine.request(TrainId(2), TrackId(1)).unwrap();
//!
//! let report = engine.detect();
//! assert!(report.detected);
//! assert_eq!(report.normalized_cycle(), vec![TrainId(1), TrainId(2)]);
//!
//! let resolution = engine.resolve(&report).unwrap();
//! assert_eq!(resolution.victim, TrainId(1));
//! assert!(!engine.detect().detected);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Allocation state, wait-for graph, cycle detection and resolution.
pub mod core;
/// Configuration models for the engine.
pub mod config;
/// Builders to construct engines from configuration.
pub mod builders;
/// Infrastructure adapters for event delivery.
pub mod infra;
/// Runtime adapters and the command/query surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
