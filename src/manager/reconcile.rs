//! The reconciliation routine.
//!
//! Every run recomputes the whole document from a fresh parse of the base
//! template and the current desired state, so duplicate or reordered
//! notifications converge on the same result.

use std::future::Future;
use std::sync::Arc;

use crate::haproxy::{merge_config, ConfigDocument};
use crate::manager::{Manager, ReconcileError};
use crate::observability::metrics;

impl Manager {
    /// Fetch, merge, validate and apply the latest desired state.
    ///
    /// The last applied snapshot only changes when the data plane accepted
    /// the new document.
    pub async fn update_config_to_latest(&self) -> Result<(), ReconcileError> {
        let result = self.reconcile().await;

        match &result {
            Ok(()) => metrics::record_reconciliation("success"),
            Err(e) => metrics::record_reconciliation(e.class().as_str()),
        }

        result
    }

    async fn reconcile(&self) -> Result<(), ReconcileError> {
        if self.managed_lb_id.is_empty() {
            return Err(ReconcileError::MissingLoadBalancerId);
        }

        let dataplane = self
            .dataplane
            .as_ref()
            .ok_or(ReconcileError::MissingCollaborator("dataplane client"))?;
        let inventory = self
            .inventory
            .as_ref()
            .ok_or(ReconcileError::MissingCollaborator("inventory client"))?;

        tracing::info!(loadbalancer.id = %self.managed_lb_id, "updating the config");

        let base = ConfigDocument::load(&self.base_config_path)?;

        let lb = self
            .cancellable(inventory.get_load_balancer(&self.managed_lb_id))
            .await??;

        let config = merge_config(base, &lb)?.to_string();

        self.cancellable(dataplane.check_config(&config))
            .await?
            .map_err(ReconcileError::Validate)?;

        self.cancellable(dataplane.post_config(&config))
            .await?
            .map_err(ReconcileError::Apply)?;

        self.current_config.store(Some(Arc::new(config)));
        tracing::info!(
            loadbalancer.id = %self.managed_lb_id,
            ports = lb.ports.len(),
            "config successfully updated"
        );

        Ok(())
    }

    /// Run `fut` unless shutdown is requested first.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, ReconcileError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ReconcileError::Cancelled),
            output = fut => Ok(output),
        }
    }
}
