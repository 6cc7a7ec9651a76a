//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the manager.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the load balancer manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// The managed load balancer and its base template.
    pub loadbalancer: LoadBalancerConfig,

    /// HAProxy Data Plane API connection.
    pub dataplane: DataPlaneConfig,

    /// Inventory (load balancer API) connection.
    pub inventory: InventoryConfig,

    /// Change event subscription settings.
    pub events: EventsConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// The load balancer this process manages.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Prefixed identifier of the managed load balancer (e.g. "loadbal-abc").
    pub id: String,

    /// Path to the base HAProxy configuration template.
    pub base_config_path: String,
}

/// Data Plane API connection and readiness settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataPlaneConfig {
    /// Base URL of the Data Plane API.
    pub url: String,

    /// Basic auth user name.
    pub user_name: String,

    /// Basic auth password.
    pub user_pwd: String,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Number of readiness probes before giving up at startup.
    pub ready_retries: u32,

    /// Interval between readiness probes in milliseconds.
    pub ready_interval_ms: u64,
}

impl Default for DataPlaneConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5555/v2/".to_string(),
            user_name: "haproxy".to_string(),
            user_pwd: "adminpwd".to_string(),
            timeout_ms: 2_000,
            ready_retries: 10,
            ready_interval_ms: 1_000,
        }
    }
}

impl DataPlaneConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }
}

/// Inventory API connection.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InventoryConfig {
    /// GraphQL endpoint of the load balancer API.
    pub url: String,

    /// Optional OIDC client credentials for the API.
    pub oidc: Option<OidcClientConfig>,
}

/// OAuth2 client credentials.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OidcClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub audience: Option<String>,
    pub scopes: Vec<String>,
}

/// Change event subscription settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Change topics to subscribe to (e.g. "load-balancer").
    pub change_topics: Vec<String>,

    /// Maximum delivery attempts for a message; 0 means unlimited.
    pub max_msg_process_attempts: u64,

    /// Delay before a negatively acknowledged message is redelivered, in milliseconds.
    pub nak_delay_ms: u64,

    /// NATS connection settings.
    pub nats: NatsConfig,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            change_topics: Vec::new(),
            max_msg_process_attempts: 0,
            nak_delay_ms: 10_000,
            nats: NatsConfig::default(),
        }
    }
}

impl EventsConfig {
    pub fn nak_delay(&self) -> Duration {
        Duration::from_millis(self.nak_delay_ms)
    }
}

/// NATS JetStream connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL.
    pub url: String,

    /// Optional path to a `.creds` file.
    pub credentials_file: Option<String>,

    /// JetStream stream carrying change events.
    pub stream: String,

    /// Subject prefix events are published under.
    pub subject_prefix: String,

    /// Consumer name prefix; a random one is generated when empty.
    pub queue_group: String,

    /// Seconds before an idle durable consumer is removed by the server.
    pub consumer_inactive_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            credentials_file: None,
            stream: "changes".to_string(),
            subject_prefix: "com.infratographer".to_string(),
            queue_group: String::new(),
            consumer_inactive_secs: 3_600,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset.
    pub level: String,

    /// Human readable output instead of JSON.
    pub pretty: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pretty: false,
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin HTTP surface settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
