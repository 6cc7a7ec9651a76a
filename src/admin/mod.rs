//! Admin HTTP surface.
//!
//! Read-only views of the manager: liveness, status, and the last
//! configuration the data plane accepted.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::manager::Manager;
use self::handlers::*;

pub fn setup_admin_router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config))
        .with_state(manager)
}

/// Serve the admin router on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    manager: Arc<Manager>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server listening");

    axum::serve(listener, setup_admin_router(manager))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
