//! Manager error taxonomy.

use thiserror::Error;

use crate::dataplane::DataPlaneError;
use crate::events::{FailureClass, HandlerError, SubscriberError};
use crate::haproxy::{MergeError, TemplateError};
use crate::inventory::InventoryError;
use crate::lifecycle::ReadinessError;

/// Failures of a single reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("managed load balancer id is not set")]
    MissingLoadBalancerId,

    #[error("manager is missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to fetch load balancer: {0}")]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("candidate config failed validation: {0}")]
    Validate(#[source] DataPlaneError),

    #[error("failed to apply config: {0}")]
    Apply(#[source] DataPlaneError),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::MissingLoadBalancerId | Self::MissingCollaborator(_) | Self::Template(_) => {
                FailureClass::Fatal
            }
            Self::Inventory(InventoryError::InvalidId(_)) => FailureClass::Permanent,
            Self::Inventory(_) => FailureClass::Retryable,
            Self::Merge(_) => FailureClass::Permanent,
            Self::Validate(DataPlaneError::ConfigInvalid(_)) => FailureClass::Permanent,
            Self::Validate(_) | Self::Apply(_) | Self::Cancelled => FailureClass::Retryable,
        }
    }
}

/// Failures of the per-message handler.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to decode change message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("change message targets more than one load balancer: {ids:?}")]
    AmbiguousTarget { ids: Vec<String> },

    #[error("failed to update haproxy config: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl ProcessError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Decode(_) | Self::AmbiguousTarget { .. } => FailureClass::Permanent,
            Self::Reconcile(e) => e.class(),
        }
    }
}

impl From<ProcessError> for HandlerError {
    fn from(err: ProcessError) -> Self {
        HandlerError::new(err.class(), err)
    }
}

/// Failures that end `Manager::run`.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("manager is missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("unable to reach dataplaneapi: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("failed to initialize the config: {0}")]
    InitialSync(#[source] ReconcileError),

    #[error(transparent)]
    Subscriber(#[from] SubscriberError),
}
