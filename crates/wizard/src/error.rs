use tenant_billing::SelectionError;
use thiserror::Error;
use uuid::Uuid;

use crate::session::WizardState;

/// Failure talking to the Tenant Subscription Service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected as invalid: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("service error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("selection is not ready: {0}")]
    Invalid(#[from] SelectionError),
    #[error("a submission is already in progress")]
    Busy,
    #[error("tenant {0} has no assigned plan yet")]
    NotAssigned(Uuid),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Edits rejected by the wizard session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WizardError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("wizard is {0} and does not accept edits")]
    Locked(WizardState),
}
