//! Desired-state subsystem.
//!
//! # Data Flow
//! ```text
//! manager asks for the managed load balancer
//!     → client.rs (id check, bearer token from auth.rs, HTTP POST)
//!     → graphql.rs (edge-wrapped wire shape)
//!     → types.rs (flat LoadBalancer → Port → Pool → Origin graph)
//! ```
//!
//! # Design Decisions
//! - One typed contract: the graph-shaped query response
//! - Nothing is cached between reconciliations
//! - The manager only sees the `LoadBalancerApi` trait

pub mod auth;
pub mod client;
pub mod graphql;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::IdError;

pub use client::InventoryClient;
pub use types::{LoadBalancer, Origin, Pool, Port};

/// Errors returned by the inventory API.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("load balancer not found")]
    NotFound,

    #[error("inventory api received unauthorized request")]
    Unauthorized,

    #[error("inventory api http error: {0}")]
    Http(reqwest::StatusCode),

    #[error("inventory api query error: {0}")]
    GraphQl(String),

    #[error("inventory api token error: {0}")]
    Token(String),

    #[error("inventory api transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Source of the desired state for a load balancer.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer, InventoryError>;
}
