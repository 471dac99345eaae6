//! Periodic deadlock monitor for deployments too large to detect per mutation.
//!
//! The monitor ticks on a tokio interval, runs a detection pass on the blocking
//! pool, optionally resolves what it finds, and hands the outcome to a
//! [`DeadlockHandler`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::core::{AllocationEngine, DeadlockReport, Resolution};

use super::Spawn;

/// Receives the outcome of every monitor tick.
#[async_trait]
pub trait DeadlockHandler: Send + Sync + 'static {
    /// Called once per tick with the report and any resolutions applied.
    async fn on_report(&self, report: DeadlockReport, resolutions: Vec<Resolution>);
}

/// Handler that only logs detected deadlocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl DeadlockHandler for LoggingHandler {
    async fn on_report(&self, report: DeadlockReport, resolutions: Vec<Resolution>) {
        if report.detected {
            tracing::warn!(
                cycle = ?report.cycle,
                state_version = report.state_version,
                resolved = resolutions.len(),
                "monitor observed deadlock"
            );
        }
    }
}

/// Background detection loop over a shared engine.
pub struct DeadlockMonitor<H> {
    engine: Arc<AllocationEngine>,
    handler: Arc<H>,
    interval: Duration,
    resolve: bool,
}

impl<H: DeadlockHandler> DeadlockMonitor<H> {
    /// Monitor using the engine's configured interval and `auto_resolve` flag.
    pub fn new(engine: Arc<AllocationEngine>, handler: H) -> Self {
        let interval = Duration::from_millis(engine.config().monitor_interval_ms);
        let resolve = engine.config().auto_resolve;
        Self {
            engine,
            handler: Arc::new(handler),
            interval,
            resolve,
        }
    }

    /// Override the tick period.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override whether detected cycles are resolved.
    #[must_use]
    pub const fn with_resolve(mut self, resolve: bool) -> Self {
        self.resolve = resolve;
        self
    }

    /// Spawn the loop. It runs until [`MonitorHandle::stop`] is called or the
    /// handle is dropped.
    pub fn start<S: Spawn>(self, spawner: &S) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let Self {
            engine,
            handler,
            interval,
            resolve,
        } = self;

        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(?interval, resolve, "deadlock monitor started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
                // Detection holds the engine lock for O(V+E); keep it off the
                // async workers.
                let pass = Arc::clone(&engine);
                let outcome = tokio::task::spawn_blocking(move || {
                    let report = pass.detect();
                    let resolutions = if report.detected && resolve {
                        pass.resolve_all()
                    } else {
                        Vec::new()
                    };
                    (report, resolutions)
                })
                .await;
                match outcome {
                    Ok((report, resolutions)) => handler.on_report(report, resolutions).await,
                    Err(err) => tracing::error!(%err, "deadlock monitor pass failed"),
                }
            }
            tracing::info!("deadlock monitor stopped");
        });

        MonitorHandle { stop: stop_tx }
    }
}

/// Stops the monitor when told to or when dropped.
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
}

impl MonitorHandle {
    /// Signal the monitor loop to exit after its current tick.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}
