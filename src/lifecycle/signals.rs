//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Trigger the shared shutdown token on the first one
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged; the process keeps running

use std::fmt;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Signal that requested shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Sigterm,
    Sigint,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
        }
    }
}

/// Wait for SIGTERM or SIGINT. Returns `None` if no handler could be installed.
pub async fn wait_for_signal() -> Option<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                return None;
            }
        };

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGINT handler");
                return None;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => Some(ShutdownSignal::Sigterm),
            _ = sigint.recv() => Some(ShutdownSignal::Sigint),
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ShutdownSignal::Sigint),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                None
            }
        }
    }
}

/// Trigger `shutdown` when the process receives a termination signal.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                if let Some(signal) = signal {
                    tracing::info!(signal = %signal, "Shutdown signal received");
                    shutdown.trigger();
                }
            }
            _ = shutdown.wait() => {}
        }
    })
}
