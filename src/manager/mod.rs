//! Reconciliation manager.
//!
//! # Data Flow
//! ```text
//! run():
//!     readiness gate → update_config_to_latest() → subscriber.listen()
//!
//! per change event (process_msg):
//!     decode → event type filter → ambiguity check → targeting filter
//!         → update_config_to_latest()
//!             → load base template (fresh parse)
//!             → inventory: get_load_balancer(managed id)
//!             → merge_config(template, desired state)
//!             → dataplane: check_config → post_config
//!             → publish last applied snapshot
//! ```
//!
//! # Design Decisions
//! - Full recompute on every qualifying event; no deltas, no cache
//! - Collaborators are optional builder fields and checked at use
//! - The last applied document is an atomically swapped snapshot read only
//!   by observers, never by decision logic

pub mod errors;
mod reconcile;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dataplane::DataPlaneApi;
use crate::events::{
    ChangeEvent, ChangeMessage, EventType, FailureClass, HandlerError, MessageHandler, Subscriber,
};
use crate::ids;
use crate::inventory::LoadBalancerApi;
use crate::lifecycle::{wait_for_dataplane_ready, ReadinessError};

pub use errors::{ManagerError, ProcessError, ReconcileError};

/// Default number of readiness probes before `run` gives up.
pub const DEFAULT_READY_RETRIES: u32 = 10;

/// Default interval between readiness probes.
pub const DEFAULT_READY_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps the data plane configuration in sync with the inventory.
pub struct Manager {
    managed_lb_id: String,
    base_config_path: PathBuf,
    dataplane: Option<Arc<dyn DataPlaneApi>>,
    inventory: Option<Arc<dyn LoadBalancerApi>>,
    current_config: ArcSwapOption<String>,
    shutdown: CancellationToken,
    ready_retries: u32,
    ready_interval: Duration,
}

impl Manager {
    pub fn new(managed_lb_id: impl Into<String>, base_config_path: impl Into<PathBuf>) -> Self {
        Self {
            managed_lb_id: managed_lb_id.into(),
            base_config_path: base_config_path.into(),
            dataplane: None,
            inventory: None,
            current_config: ArcSwapOption::empty(),
            shutdown: CancellationToken::new(),
            ready_retries: DEFAULT_READY_RETRIES,
            ready_interval: DEFAULT_READY_INTERVAL,
        }
    }

    pub fn with_dataplane(mut self, dataplane: Arc<dyn DataPlaneApi>) -> Self {
        self.dataplane = Some(dataplane);
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn LoadBalancerApi>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_readiness(mut self, retries: u32, interval: Duration) -> Self {
        self.ready_retries = retries;
        self.ready_interval = interval;
        self
    }

    pub fn managed_id(&self) -> &str {
        &self.managed_lb_id
    }

    /// The last document the data plane accepted, if any.
    pub fn current_config(&self) -> Option<Arc<String>> {
        self.current_config.load_full()
    }

    /// True when the managed load balancer is the subject or an additional
    /// subject of `msg`.
    pub fn is_targeted(&self, msg: &ChangeMessage) -> bool {
        msg.subject_ids().any(|id| id == self.managed_lb_id)
    }

    /// Handle one delivered change event.
    pub async fn process_msg(&self, event: &ChangeEvent) -> Result<(), ProcessError> {
        let msg = event.decode().map_err(|e| {
            tracing::error!(error = %e, "failed to process data in msg");
            ProcessError::from(e)
        })?;

        match msg.event_type {
            EventType::Create | EventType::Update | EventType::Delete => {}
            EventType::Other(ref other) => {
                tracing::debug!(event_type = %other, "ignoring msg, not a create/update/delete event");
                return Ok(());
            }
        }

        let lb_ids: BTreeSet<&str> = msg
            .subject_ids()
            .filter(|id| ids::has_load_balancer_kind(id))
            .collect();
        if lb_ids.len() > 1 {
            return Err(ProcessError::AmbiguousTarget {
                ids: lb_ids.into_iter().map(str::to_string).collect(),
            });
        }

        if !self.is_targeted(&msg) {
            tracing::debug!(
                loadbalancer.id = %self.managed_lb_id,
                subject_id = %msg.subject_id,
                "ignoring msg, not targeted for this load balancer"
            );
            return Ok(());
        }

        tracing::info!(
            loadbalancer.id = %self.managed_lb_id,
            event_type = %msg.event_type,
            "received change event for managed load balancer"
        );

        self.update_config_to_latest().await.map_err(|e| {
            tracing::error!(loadbalancer.id = %self.managed_lb_id, error = %e, "failed to update haproxy config");
            ProcessError::from(e)
        })
    }

    /// Gate on readiness, sync once, then consume change events until the
    /// subscriber stops.
    pub async fn run(self: &Arc<Self>, subscriber: &mut Subscriber) -> Result<(), ManagerError> {
        let dataplane = self
            .dataplane
            .as_ref()
            .ok_or(ManagerError::MissingCollaborator("dataplane client"))?;
        if self.inventory.is_none() {
            return Err(ManagerError::MissingCollaborator("inventory client"));
        }

        match wait_for_dataplane_ready(
            dataplane.as_ref(),
            self.ready_retries,
            self.ready_interval,
            &self.shutdown,
        )
        .await
        {
            Ok(()) => {}
            Err(ReadinessError::Cancelled) => {
                tracing::info!("shutdown requested before dataplaneapi became ready");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        // use desired config on start
        if let Err(e) = self.update_config_to_latest().await {
            if e.class() == FailureClass::Fatal {
                return Err(ManagerError::InitialSync(e));
            }
            tracing::error!(loadbalancer.id = %self.managed_lb_id, error = %e, "failed to initialize the config");
        }

        subscriber.set_handler(Arc::clone(self) as Arc<dyn MessageHandler>);
        subscriber.listen().await?;

        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Manager {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError> {
        self.process_msg(event).await.map_err(HandlerError::from)
    }
}
