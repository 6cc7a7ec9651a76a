//! Data plane readiness gate.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::dataplane::DataPlaneApi;
use crate::observability::metrics;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("dataplaneapi failed to become ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("cancelled while waiting for dataplaneapi")]
    Cancelled,
}

/// Poll `api` up to `retries` times, sleeping `interval` between attempts.
pub async fn wait_for_dataplane_ready(
    api: &dyn DataPlaneApi,
    retries: u32,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<(), ReadinessError> {
    for attempt in 1..=retries {
        let ready = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(ReadinessError::Cancelled),
            ready = api.api_is_ready() => ready,
        };

        if ready {
            tracing::info!(attempt, "dataplaneapi is ready");
            metrics::set_dataplane_ready(true);
            return Ok(());
        }

        metrics::set_dataplane_ready(false);
        if attempt == retries {
            break;
        }

        tracing::info!(attempt, retries, "waiting for dataplaneapi to become ready");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(ReadinessError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Err(ReadinessError::NotReady { attempts: retries })
}
