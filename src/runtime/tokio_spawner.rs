//! Tokio runtime spawner implementation.

use std::future::Future;

use super::Spawn;

/// Tokio-based spawner that runs background work on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner bound to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
