//! Data plane subsystem.
//!
//! # Data Flow
//! ```text
//! readiness gate → api_is_ready (GET base url)
//! reconciliation → check_config (POST raw?only_validate=true)
//!                → post_config  (POST raw?skip_version=true)
//! ```
//!
//! # Design Decisions
//! - The configuration document travels as opaque text/plain
//! - Invalid documents are reported apart from transport/auth failures
//! - Every request has a short deadline; callers add cancellation on top

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use client::DataPlaneClient;

/// Errors returned by the Data Plane API.
#[derive(Debug, Error)]
pub enum DataPlaneError {
    #[error("dataplaneapi received unauthorized request")]
    Unauthorized,

    #[error("dataplaneapi config is invalid: {0}")]
    ConfigInvalid(String),

    #[error("dataplaneapi http error: {0}")]
    Http(reqwest::StatusCode),

    #[error("dataplaneapi transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid dataplaneapi url {0:?}")]
    InvalidUrl(String),
}

/// Administrative API of the proxy data plane.
#[async_trait]
pub trait DataPlaneApi: Send + Sync {
    /// True when the API answers its root endpoint with 200.
    async fn api_is_ready(&self) -> bool;

    /// Validate a candidate configuration without applying it.
    async fn check_config(&self, config: &str) -> Result<(), DataPlaneError>;

    /// Replace the running configuration.
    async fn post_config(&self, config: &str) -> Result<(), DataPlaneError>;
}
