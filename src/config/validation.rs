//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check mandatory settings are present
//! - Validate identifiers and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ManagerConfig;
use crate::ids::{IdError, PrefixedId};

/// A single semantic problem with the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one change topic is required")]
    TopicsRequired,

    #[error("change topic {index} is blank")]
    BlankTopic { index: usize },

    #[error("base haproxy config path is required")]
    BaseConfigRequired,

    #[error("inventory url is required")]
    InventoryUrlRequired,

    #[error("invalid {field} url {value:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("loadbalancer id is required")]
    LoadBalancerIdRequired,

    #[error(transparent)]
    LoadBalancerId(#[from] IdError),

    #[error("dataplane ready retries must be greater than zero")]
    ReadyRetriesZero,

    #[error("oidc token url is required when a client id is set")]
    OidcTokenUrlRequired,
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let topics = &config.events.change_topics;
    if topics.is_empty() {
        errors.push(ValidationError::TopicsRequired);
    }
    for (index, _) in topics.iter().enumerate().filter(|(_, t)| t.trim().is_empty()) {
        errors.push(ValidationError::BlankTopic { index });
    }

    if config.loadbalancer.base_config_path.is_empty() {
        errors.push(ValidationError::BaseConfigRequired);
    }

    if config.inventory.url.is_empty() {
        errors.push(ValidationError::InventoryUrlRequired);
    } else if let Err(e) = url::Url::parse(&config.inventory.url) {
        errors.push(ValidationError::InvalidUrl {
            field: "inventory",
            value: config.inventory.url.clone(),
            reason: e.to_string(),
        });
    }

    if config.loadbalancer.id.is_empty() {
        errors.push(ValidationError::LoadBalancerIdRequired);
    } else if let Err(e) = PrefixedId::parse_load_balancer(&config.loadbalancer.id) {
        errors.push(e.into());
    }

    errors.extend(validate_dataplane(config));

    if let Some(oidc) = &config.inventory.oidc {
        if !oidc.client_id.is_empty() && oidc.token_url.is_empty() {
            errors.push(ValidationError::OidcTokenUrlRequired);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The subset of checks the `check-dataplane` command needs.
pub fn validate_dataplane(config: &ManagerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = url::Url::parse(&config.dataplane.url) {
        errors.push(ValidationError::InvalidUrl {
            field: "dataplane",
            value: config.dataplane.url.clone(),
            reason: e.to_string(),
        });
    }

    if config.dataplane.ready_retries == 0 {
        errors.push(ValidationError::ReadyRetriesZero);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ManagerConfig {
        let mut config = ManagerConfig::default();
        config.loadbalancer.id = "loadbal-test".to_string();
        config.loadbalancer.base_config_path = "/etc/haproxy/haproxy.cfg".to_string();
        config.inventory.url = "http://inventory.local/query".to_string();
        config.events.change_topics = vec!["load-balancer".to_string()];
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(validate_config(&valid_config()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = validate_config(&ManagerConfig::default()).unwrap_err();

        assert!(errors.contains(&ValidationError::TopicsRequired));
        assert!(errors.contains(&ValidationError::BaseConfigRequired));
        assert!(errors.contains(&ValidationError::InventoryUrlRequired));
        assert!(errors.contains(&ValidationError::LoadBalancerIdRequired));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_rejects_non_load_balancer_id() {
        let mut config = valid_config();
        config.loadbalancer.id = "loadprt-test".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::LoadBalancerId(IdError::WrongKind { .. })]
        ));
    }

    #[test]
    fn test_rejects_blank_topics() {
        let mut config = valid_config();
        config.events.change_topics = vec!["load-balancer".to_string(), "".to_string(), " ".to_string()];

        assert_eq!(
            validate_config(&config),
            Err(vec![
                ValidationError::BlankTopic { index: 1 },
                ValidationError::BlankTopic { index: 2 },
            ])
        );
    }

    #[test]
    fn test_rejects_bad_urls_and_retries() {
        let mut config = valid_config();
        config.inventory.url = "not a url".to_string();
        config.dataplane.url = "::".to_string();
        config.dataplane.ready_retries = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ReadyRetriesZero));
    }
}
