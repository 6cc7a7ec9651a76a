use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::manager::Manager;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub loadbalancer_id: String,
    pub config_applied: bool,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn get_status(State(manager): State<Arc<Manager>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        loadbalancer_id: manager.managed_id().to_string(),
        config_applied: manager.current_config().is_some(),
    })
}

pub async fn get_config(State(manager): State<Arc<Manager>>) -> Response {
    match manager.current_config() {
        Some(config) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            config.as_str().to_owned(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no configuration applied yet").into_response(),
    }
}
