//! HTTP client for the HAProxy Data Plane API.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::config::DataPlaneConfig;
use crate::dataplane::{DataPlaneApi, DataPlaneError};

const RAW_CONFIG_PATH: &str = "/services/haproxy/configuration/raw";

/// Data Plane API client using basic auth.
#[derive(Debug, Clone)]
pub struct DataPlaneClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl DataPlaneClient {
    pub fn new(config: &DataPlaneConfig) -> Result<Self, DataPlaneError> {
        url::Url::parse(&config.url).map_err(|_| DataPlaneError::InvalidUrl(config.url.clone()))?;

        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.url.clone(),
            user: config.user_name.clone(),
            password: config.user_pwd.clone(),
        })
    }

    fn raw_config_url(&self, query: &str) -> String {
        format!(
            "{}{}?{}",
            self.base_url.trim_end_matches('/'),
            RAW_CONFIG_PATH,
            query
        )
    }

    async fn post_raw(&self, query: &str, config: &str) -> Result<reqwest::Response, DataPlaneError> {
        let resp = self
            .http
            .post(self.raw_config_url(query))
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_TYPE, "text/plain")
            .body(config.to_string())
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl DataPlaneApi for DataPlaneClient {
    async fn api_is_ready(&self) -> bool {
        let result = self
            .http
            .get(&self.base_url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await;

        match result {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "dataplaneapi readiness probe failed");
                false
            }
        }
    }

    async fn check_config(&self, config: &str) -> Result<(), DataPlaneError> {
        let resp = self.post_raw("only_validate=true", config).await?;

        match resp.status() {
            StatusCode::ACCEPTED | StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(DataPlaneError::Unauthorized),
            StatusCode::BAD_REQUEST => {
                let body = resp.text().await.unwrap_or_default();
                Err(DataPlaneError::ConfigInvalid(body))
            }
            status => Err(DataPlaneError::Http(status)),
        }
    }

    async fn post_config(&self, config: &str) -> Result<(), DataPlaneError> {
        let resp = self.post_raw("skip_version=true", config).await?;

        match resp.status() {
            StatusCode::ACCEPTED | StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(DataPlaneError::Unauthorized),
            status => Err(DataPlaneError::Http(status)),
        }
    }
}
