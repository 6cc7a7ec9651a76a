//! Shutdown coordination for the manager.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Deadline for releasing the broker connection once `run` has returned.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator for graceful shutdown.
///
/// Wraps a cancellation token that every long-running task observes: the
/// readiness gate, outbound reconciliation calls, broker forwarders and the
/// subscriber readers.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to tasks that must stop on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
