//! Prefixed resource identifiers.
//!
//! Identifiers look like `loadbal-7p3ee9hq7bnjtycmnqb8r`: a seven character
//! kind prefix, a dash, and an opaque suffix. Only the prefix is ever
//! interpreted.

use std::fmt;
use thiserror::Error;

/// Length of the kind prefix.
pub const PREFIX_LEN: usize = 7;

/// Kind prefix of load balancer identifiers.
pub const LOAD_BALANCER_PREFIX: &str = "loadbal";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid id {0:?}: expected <{PREFIX_LEN} char prefix>-<suffix>")]
    Malformed(String),

    #[error("invalid id {id:?}: expected prefix {expected:?}")]
    WrongKind { id: String, expected: &'static str },
}

/// A validated prefixed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefixedId(String);

impl PrefixedId {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let malformed = || IdError::Malformed(raw.to_string());
        let (prefix, suffix) = raw.split_once('-').ok_or_else(malformed)?;

        if prefix.len() != PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(malformed());
        }
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(malformed());
        }

        Ok(Self(raw.to_string()))
    }

    /// Parse and require a load balancer kind prefix.
    pub fn parse_load_balancer(raw: &str) -> Result<Self, IdError> {
        let id = Self::parse(raw)?;
        if !id.is_load_balancer() {
            return Err(IdError::WrongKind {
                id: raw.to_string(),
                expected: LOAD_BALANCER_PREFIX,
            });
        }
        Ok(id)
    }

    pub fn prefix(&self) -> &str {
        &self.0[..PREFIX_LEN]
    }

    pub fn is_load_balancer(&self) -> bool {
        self.prefix() == LOAD_BALANCER_PREFIX
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrefixedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when `raw` carries the load balancer kind tag, without full validation.
pub fn has_load_balancer_kind(raw: &str) -> bool {
    raw.split_once('-')
        .is_some_and(|(prefix, _)| prefix == LOAD_BALANCER_PREFIX)
}
