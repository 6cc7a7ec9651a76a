//! Inventory API client.
//!
//! # Responsibilities
//! - Validate the requested identifier before querying
//! - Run the load balancer query over HTTP
//! - Attach a bearer token when client credentials are configured
//! - Translate API failures into typed errors

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::InventoryConfig;
use crate::ids::PrefixedId;
use crate::inventory::auth::TokenSource;
use crate::inventory::graphql::{self, GET_LOAD_BALANCER_QUERY};
use crate::inventory::types::LoadBalancer;
use crate::inventory::{InventoryError, LoadBalancerApi};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the inventory GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    url: String,
    token_source: Option<Arc<TokenSource>>,
}

impl InventoryClient {
    pub fn new(url: impl Into<String>) -> Result<Self, InventoryError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.into(),
            token_source: None,
        })
    }

    /// Build a client from configuration, enabling client credentials when set.
    pub fn from_config(config: &InventoryConfig) -> Result<Self, InventoryError> {
        let client = Self::new(config.url.clone())?;

        match &config.oidc {
            Some(oidc) if !oidc.client_id.is_empty() => {
                let source = TokenSource::new(client.http.clone(), oidc.clone());
                Ok(client.with_token_source(source))
            }
            _ => Ok(client),
        }
    }

    pub fn with_token_source(mut self, source: TokenSource) -> Self {
        self.token_source = Some(Arc::new(source));
        self
    }
}

#[async_trait]
impl LoadBalancerApi for InventoryClient {
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer, InventoryError> {
        PrefixedId::parse(id)?;

        let body = graphql::Request {
            query: GET_LOAD_BALANCER_QUERY,
            variables: graphql::Variables { id },
        };

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(source) = &self.token_source {
            request = request.bearer_auth(source.token().await?);
        }

        let resp = request.send().await?;
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(InventoryError::Unauthorized),
            status => return Err(InventoryError::Http(status)),
        }

        let payload: graphql::Response = resp.json().await?;
        if let Some(err) = payload.errors.first() {
            return Err(translate_graphql_error(&err.message));
        }

        payload
            .data
            .and_then(|data| data.load_balancer)
            .map(LoadBalancer::from)
            .ok_or(InventoryError::NotFound)
    }
}

fn translate_graphql_error(message: &str) -> InventoryError {
    if message.contains("load_balancer not found") {
        InventoryError::NotFound
    } else if message.contains("invalid or expired jwt") {
        InventoryError::Unauthorized
    } else {
        InventoryError::GraphQl(message.to_string())
    }
}
