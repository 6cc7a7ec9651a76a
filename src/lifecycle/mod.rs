//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (readiness.rs):
//!     Poll dataplaneapi → ready | NotReady | Cancelled
//!
//! Shutdown (shutdown.rs):
//!     Token cancelled → readers stop → broker closed within deadline → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: readiness, initial reconciliation, then subscriptions
//! - One cancellation token threads through every suspension point
//! - Shutdown has timeout: the broker close is abandoned after the deadline

pub mod readiness;
pub mod shutdown;
pub mod signals;

pub use readiness::{wait_for_dataplane_ready, ReadinessError};
pub use shutdown::{Shutdown, CLOSE_TIMEOUT};
