//! HAProxy load balancer manager.
//!
//! Sidecar that keeps an HAProxy data plane in sync with the desired state
//! recorded by the load balancer inventory.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                 LOADBALANCER MANAGER                  │
//!                 │                                                       │
//!   NATS          │  ┌──────────┐    ┌────────────┐    ┌───────────────┐  │
//!   JetStream ────┼─▶│  events  │───▶│  manager   │───▶│   inventory   │◀─┼──── Load balancer
//!   (changes)     │  │subscriber│    │ (targeting,│    │ (GraphQL)     │  │     API
//!                 │  └──────────┘    │ reconcile) │    └───────────────┘  │
//!                 │       ▲          └─────┬──────┘                       │
//!                 │  ack/nak/term          │                              │
//!                 │                        ▼                              │
//!                 │                 ┌────────────┐    ┌───────────────┐   │
//!                 │                 │  haproxy   │───▶│   dataplane   │───┼──▶ HAProxy
//!                 │                 │  (merge)   │    │ (validate,    │   │    Data Plane API
//!                 │                 └────────────┘    │  apply)       │   │
//!                 │                                   └───────────────┘   │
//!                 │  ┌─────────────────────────────────────────────────┐  │
//!                 │  │  config · lifecycle · observability · admin      │  │
//!                 │  └─────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use loadbalancer_manager::admin;
use loadbalancer_manager::cli::{Cli, Command, DataPlaneArgs, RunArgs};
use loadbalancer_manager::config::{LoggingConfig, ManagerConfig};
use loadbalancer_manager::dataplane::DataPlaneClient;
use loadbalancer_manager::events::{NatsConnection, Subscriber};
use loadbalancer_manager::inventory::InventoryClient;
use loadbalancer_manager::lifecycle::{self, signals, Shutdown, CLOSE_TIMEOUT};
use loadbalancer_manager::manager::Manager;
use loadbalancer_manager::observability::{logging, metrics};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run(args) => run(&cli, args).await,
        Command::CheckDataplane(args) => check_dataplane(&cli, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "loadbalancer-manager failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<(), BoxError> {
    let config = match cli.run_config(args) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&LoggingConfig::default());
            return Err(e.into());
        }
    };
    logging::init(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        loadbalancer.id = %config.loadbalancer.id,
        config_file = ?cli.config_path(),
        "Initializing..."
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    start_metrics(&config);

    let dataplane = Arc::new(DataPlaneClient::new(&config.dataplane)?);
    let inventory = Arc::new(InventoryClient::from_config(&config.inventory)?);

    let manager = Arc::new(
        Manager::new(config.loadbalancer.id.clone(), config.loadbalancer.base_config_path.clone())
            .with_dataplane(dataplane)
            .with_inventory(inventory)
            .with_shutdown(shutdown.token())
            .with_readiness(config.dataplane.ready_retries, config.dataplane.ready_interval()),
    );

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let manager = Arc::clone(&manager);
        let token = shutdown.token();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, manager, token).await {
                tracing::error!(error = %e, "admin server failed");
            }
        });
    }

    let connection = Arc::new(NatsConnection::connect(&config.events.nats, &shutdown.token()).await?);
    let mut subscriber = Subscriber::new(connection, shutdown.token())
        .with_max_msg_process_attempts(config.events.max_msg_process_attempts)
        .with_nak_delay(config.events.nak_delay());

    for topic in &config.events.change_topics {
        if let Err(e) = subscriber.subscribe(topic).await {
            tracing::error!(topic = %topic, error = %e, "failed to subscribe to change topic");
            return Err(e.into());
        }
    }

    let result = manager.run(&mut subscriber).await;

    shutdown.trigger();
    match tokio::time::timeout(CLOSE_TIMEOUT, subscriber.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "error closing change event connection"),
        Err(_) => tracing::warn!(timeout = ?CLOSE_TIMEOUT, "timed out closing change event connection"),
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn check_dataplane(cli: &Cli, args: &DataPlaneArgs) -> Result<(), BoxError> {
    let config = cli.check_config(args)?;
    logging::init(&config.logging);

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let client = DataPlaneClient::new(&config.dataplane)?;
    lifecycle::wait_for_dataplane_ready(
        &client,
        config.dataplane.ready_retries,
        config.dataplane.ready_interval(),
        &shutdown.token(),
    )
    .await?;

    tracing::info!(url = %config.dataplane.url, "dataplaneapi is ready");
    Ok(())
}

fn start_metrics(config: &ManagerConfig) {
    if !config.metrics.enabled {
        return;
    }

    match config.metrics.address.parse() {
        Ok(addr) => {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to install metrics exporter");
            }
        }
        Err(_) => tracing::error!(
            metrics_address = %config.metrics.address,
            "Failed to parse metrics address"
        ),
    }
}
