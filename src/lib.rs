//! HAProxy load balancer manager library.
//!
//! Reconciles an HAProxy data plane against the load balancer inventory,
//! driven by change events.

pub mod admin;
pub mod cli;
pub mod config;
pub mod dataplane;
pub mod events;
pub mod haproxy;
pub mod ids;
pub mod inventory;
pub mod lifecycle;
pub mod manager;
pub mod observability;

pub use config::schema::ManagerConfig;
pub use lifecycle::Shutdown;
pub use manager::Manager;
