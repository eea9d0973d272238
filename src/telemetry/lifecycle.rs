// SPDX-License-Identifier: MIT
//! Combined shutdown of heterogeneous telemetry pipelines.
//!
//! Each pipeline is registered with a [`ShutdownRegistry`] as a [`Shutdown`]
//! capability. [`ShutdownRegistry::shutdown_all`] drains the registry, runs every
//! shutdown in registration order under one shared deadline and joins all
//! failures into a single [`ShutdownError`]. The registry is empty afterwards,
//! so calling it again is a no-op that returns `Ok(())`.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Something that can be flushed and shut down exactly once.
///
/// Implementations may block; the registry runs them on the blocking pool.
pub trait Shutdown: Send + Sync + 'static {
    /// Name reported in failures, e.g. `traces`.
    fn name(&self) -> &str;

    /// Flush pending data and release the exporter, giving up after `timeout`.
    fn shutdown(&self, timeout: Duration) -> OTelSdkResult;
}

/// Why one registered shutdown failed.
#[derive(Debug, Error)]
pub enum ShutdownCause {
    /// The provider reported an error while flushing or closing.
    #[error(transparent)]
    Exporter(#[from] OTelSdkError),

    /// The shared deadline passed before this shutdown completed.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The shutdown panicked or its task was cancelled.
    #[error("shutdown task failed: {0}")]
    Panicked(String),
}

/// A failed shutdown together with the pipeline it belongs to.
#[derive(Debug, Error)]
#[error("{pipeline}: {cause}")]
pub struct ShutdownFailure {
    /// Name of the failing pipeline.
    pub pipeline: String,
    /// What went wrong.
    #[source]
    pub cause: ShutdownCause,
}

/// Every failure collected by one [`ShutdownRegistry::shutdown_all`] call.
#[derive(Debug, Error)]
#[error("{} telemetry pipeline(s) failed to shut down: {}", .failures.len(), join_failures(.failures))]
pub struct ShutdownError {
    failures: Vec<ShutdownFailure>,
}

impl ShutdownError {
    /// The individual failures, in registration order.
    pub fn failures(&self) -> &[ShutdownFailure] {
        &self.failures
    }

    /// Whether the pipeline named `name` is among the failures.
    pub fn contains(&self, name: &str) -> bool {
        self.failures.iter().any(|f| f.pipeline == name)
    }
}

fn join_failures(failures: &[ShutdownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordered list of pending shutdowns.
#[derive(Default)]
pub struct ShutdownRegistry {
    pending: Mutex<Vec<Arc<dyn Shutdown>>>,
}

impl ShutdownRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `target`; it runs after everything registered before it.
    pub fn register(&self, target: impl Shutdown) {
        self.pending.lock().push(Arc::new(target));
    }

    /// Number of shutdowns still pending.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Runs and clears every pending shutdown.
    ///
    /// `timeout` bounds the whole sequence. Each shutdown is handed whatever is
    /// left of it. One still running when it elapses is abandoned and reported
    /// as [`ShutdownCause::DeadlineExceeded`]; the remaining ones still get
    /// their (possibly zero) share of time.
    pub async fn shutdown_all(&self, timeout: Duration) -> Result<(), ShutdownError> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();

        for target in pending {
            let pipeline = target.name().to_string();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let task = tokio::task::spawn_blocking(move || target.shutdown(remaining));

            let cause = match tokio::time::timeout(remaining, task).await {
                Ok(Ok(Ok(()))) => {
                    debug!(pipeline = %pipeline, "telemetry pipeline shut down");
                    continue;
                }
                Ok(Ok(Err(err))) => ShutdownCause::Exporter(err),
                Ok(Err(join)) => ShutdownCause::Panicked(join.to_string()),
                Err(_) => ShutdownCause::DeadlineExceeded(timeout),
            };
            failures.push(ShutdownFailure { pipeline, cause });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .pending
            .lock()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("ShutdownRegistry")
            .field("pending", &names)
            .finish()
    }
}
