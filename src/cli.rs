//! Command-line interface.
//!
//! Flags and `LBMANAGER_*` environment variables override values read from the
//! optional TOML file. Validation runs on the merged result.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::loader::read_config;
use crate::config::validation::{validate_config, validate_dataplane};
use crate::config::{ConfigError, DataPlaneConfig, ManagerConfig, OidcClientConfig};

/// Readiness probes made by `check-dataplane` unless overridden.
pub const CHECK_DATAPLANE_RETRIES: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "loadbalancer-manager", version)]
#[command(about = "Keeps an HAProxy data plane in sync with the load balancer inventory", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "LBMANAGER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LBMANAGER_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Human readable logs instead of JSON
    #[arg(long, env = "LBMANAGER_LOG_PRETTY", global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the manager
    Run(RunArgs),
    /// Wait for the data plane API and exit
    CheckDataplane(DataPlaneArgs),
}

#[derive(Debug, Default, Args)]
pub struct DataPlaneArgs {
    /// DataplaneAPI base url
    #[arg(long, env = "LBMANAGER_DATAPLANE_URL")]
    pub dataplane_url: Option<String>,

    /// DataplaneAPI user name
    #[arg(long, env = "LBMANAGER_DATAPLANE_USER_NAME")]
    pub dataplane_user_name: Option<String>,

    /// DataplaneAPI user password
    #[arg(long, env = "LBMANAGER_DATAPLANE_USER_PWD", hide_env_values = true)]
    pub dataplane_user_pwd: Option<String>,

    /// Readiness probes before giving up
    #[arg(long, env = "LBMANAGER_DATAPLANE_READY_RETRIES")]
    pub dataplane_ready_retries: Option<u32>,

    /// Milliseconds between readiness probes
    #[arg(long, env = "LBMANAGER_DATAPLANE_READY_INTERVAL_MS")]
    pub dataplane_ready_interval_ms: Option<u64>,
}

impl DataPlaneArgs {
    pub fn apply(&self, config: &mut DataPlaneConfig) {
        if let Some(url) = &self.dataplane_url {
            config.url = url.clone();
        }
        if let Some(name) = &self.dataplane_user_name {
            config.user_name = name.clone();
        }
        if let Some(pwd) = &self.dataplane_user_pwd {
            config.user_pwd = pwd.clone();
        }
        if let Some(retries) = self.dataplane_ready_retries {
            config.ready_retries = retries;
        }
        if let Some(interval) = self.dataplane_ready_interval_ms {
            config.ready_interval_ms = interval;
        }
    }
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub dataplane: DataPlaneArgs,

    /// Loadbalancer ID to act on event changes
    #[arg(long, env = "LBMANAGER_LOADBALANCER_ID")]
    pub loadbalancer_id: Option<String>,

    /// Base config for haproxy
    #[arg(long, env = "LBMANAGER_BASE_HAPROXY_CONFIG")]
    pub base_haproxy_config: Option<String>,

    /// Event change topics to subscribe to
    #[arg(long, env = "LBMANAGER_CHANGE_TOPICS", value_delimiter = ',')]
    pub change_topics: Vec<String>,

    /// Maximum number of attempts at processing an event message
    #[arg(long, env = "LBMANAGER_MAX_MSG_PROCESS_ATTEMPTS")]
    pub max_msg_process_attempts: Option<u64>,

    /// LoadbalancerAPI url
    #[arg(long, env = "LBMANAGER_LOADBALANCERAPI_URL")]
    pub loadbalancerapi_url: Option<String>,

    #[arg(long, env = "LBMANAGER_OIDC_CLIENT_ID")]
    pub oidc_client_id: Option<String>,

    #[arg(long, env = "LBMANAGER_OIDC_CLIENT_SECRET", hide_env_values = true)]
    pub oidc_client_secret: Option<String>,

    #[arg(long, env = "LBMANAGER_OIDC_TOKEN_URL")]
    pub oidc_token_url: Option<String>,

    #[arg(long, env = "LBMANAGER_OIDC_AUDIENCE")]
    pub oidc_audience: Option<String>,

    #[arg(long, env = "LBMANAGER_NATS_URL")]
    pub nats_url: Option<String>,

    #[arg(long, env = "LBMANAGER_NATS_CREDS_FILE")]
    pub nats_creds_file: Option<String>,

    #[arg(long, env = "LBMANAGER_NATS_STREAM")]
    pub nats_stream: Option<String>,

    #[arg(long, env = "LBMANAGER_NATS_SUBJECT_PREFIX")]
    pub nats_subject_prefix: Option<String>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut ManagerConfig) {
        self.dataplane.apply(&mut config.dataplane);

        if let Some(id) = &self.loadbalancer_id {
            config.loadbalancer.id = id.clone();
        }
        if let Some(path) = &self.base_haproxy_config {
            config.loadbalancer.base_config_path = path.clone();
        }
        if !self.change_topics.is_empty() {
            config.events.change_topics = self.change_topics.clone();
        }
        if let Some(max) = self.max_msg_process_attempts {
            config.events.max_msg_process_attempts = max;
        }
        if let Some(url) = &self.loadbalancerapi_url {
            config.inventory.url = url.clone();
        }

        if self.oidc_client_id.is_some() || self.oidc_client_secret.is_some() || self.oidc_token_url.is_some() {
            let oidc = config.inventory.oidc.get_or_insert_with(OidcClientConfig::default);
            if let Some(id) = &self.oidc_client_id {
                oidc.client_id = id.clone();
            }
            if let Some(secret) = &self.oidc_client_secret {
                oidc.client_secret = secret.clone();
            }
            if let Some(url) = &self.oidc_token_url {
                oidc.token_url = url.clone();
            }
            if self.oidc_audience.is_some() {
                oidc.audience = self.oidc_audience.clone();
            }
        }

        let nats = &mut config.events.nats;
        if let Some(url) = &self.nats_url {
            nats.url = url.clone();
        }
        if self.nats_creds_file.is_some() {
            nats.credentials_file = self.nats_creds_file.clone();
        }
        if let Some(stream) = &self.nats_stream {
            nats.stream = stream.clone();
        }
        if let Some(prefix) = &self.nats_subject_prefix {
            nats.subject_prefix = prefix.clone();
        }
    }
}

impl Cli {
    fn base_config(&self) -> Result<ManagerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ManagerConfig::default(),
        };

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.pretty {
            config.logging.pretty = true;
        }

        Ok(config)
    }

    /// File values with `args` layered on top, fully validated.
    pub fn run_config(&self, args: &RunArgs) -> Result<ManagerConfig, ConfigError> {
        let mut config = self.base_config()?;
        args.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Configuration for `check-dataplane`; only the data plane is validated.
    pub fn check_config(&self, args: &DataPlaneArgs) -> Result<ManagerConfig, ConfigError> {
        let mut config = self.base_config()?;
        config.dataplane.ready_retries = CHECK_DATAPLANE_RETRIES;
        args.apply(&mut config.dataplane);

        let errors = validate_dataplane(&config);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(config)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}
