//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command line / environment overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → handed to the manager, clients and subscriber
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AdminConfig, DataPlaneConfig, EventsConfig, InventoryConfig, LoadBalancerConfig,
    LoggingConfig, ManagerConfig, MetricsConfig, NatsConfig, OidcClientConfig,
};
pub use validation::ValidationError;
