//! OAuth2 client-credentials token source for the inventory API.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::OidcClientConfig;
use crate::inventory::InventoryError;

/// Tokens are refreshed this long before they expire.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .map_or(true, |at| Instant::now() + EXPIRY_LEEWAY < at)
    }
}

/// Fetches and caches bearer tokens.
#[derive(Debug)]
pub struct TokenSource {
    http: reqwest::Client,
    config: OidcClientConfig,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, config: OidcClientConfig) -> Self {
        Self {
            http,
            config,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new one when needed.
    pub async fn token(&self) -> Result<String, InventoryError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken, InventoryError> {
        let scope = self.config.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        if let Some(audience) = &self.config.audience {
            form.push(("audience", audience.as_str()));
        }

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(InventoryError::Token(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| InventoryError::Token(format!("invalid token response: {e}")))?;

        tracing::debug!(expires_in = ?body.expires_in, "fetched inventory access token");

        Ok(CachedToken {
            value: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OidcClientConfig {
        OidcClientConfig {
            client_id: "lbmanager".to_string(),
            client_secret: "s3cret".to_string(),
            token_url: format!("{}/oauth/token", server.uri()),
            audience: None,
            scopes: vec!["read:lb".to_string()],
        }
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::new(reqwest::Client::new(), config(&server));
        assert_eq!(source.token().await.unwrap(), "abc");
        assert_eq!(source.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_expired_token_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short",
                "expires_in": 1
            })))
            .expect(2)
            .mount(&server)
            .await;

        let source = TokenSource::new(reqwest::Client::new(), config(&server));
        source.token().await.unwrap();
        source.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_endpoint_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = TokenSource::new(reqwest::Client::new(), config(&server));
        let err = source.token().await.unwrap_err();
        assert!(matches!(err, InventoryError::Token(_)));
    }
}
