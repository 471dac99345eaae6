//! Runtime adapters and the command/query surface consumed by service layers.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod monitor;
pub mod spawn;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use api::{execute, Command, CommandResponse, DetectResponse, TrackView, TrainView};
#[cfg(feature = "tokio-runtime")]
pub use monitor::{DeadlockHandler, DeadlockMonitor, LoggingHandler, MonitorHandle};
pub use spawn::Spawn;
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
