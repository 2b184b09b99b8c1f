use super::access::Action;
use super::domain::{RecordKind, RecordRef, UserId};
use super::repository::StoreError;
use super::validation::ValidationError;

/// Error taxonomy surfaced by the matching engine, lifecycle manager and registry facade.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{record} not found")]
    NotFound { record: RecordRef },
    #[error("user '{actor}' is not permitted to {}", action.label())]
    Unauthorized { actor: UserId, action: Action },
    #[error("{kind} cannot move from {from} to {to}")]
    IllegalTransition {
        kind: RecordKind,
        from: &'static str,
        to: &'static str,
    },
    #[error("{record} was modified concurrently; reload and retry")]
    Conflict { record: RecordRef },
    #[error(transparent)]
    Store(StoreError),
    #[error("{record} could not be restored after an aborted fulfillment: {reason}")]
    RollbackFailed { record: RecordRef, reason: String },
}

impl RegistryError {
    /// Wrap a store failure observed while operating on `record`.
    pub fn from_store(record: RecordRef, error: StoreError) -> Self {
        match error {
            StoreError::NotFound => RegistryError::NotFound { record },
            StoreError::Conflict { .. } => RegistryError::Conflict { record },
            StoreError::Validation(error) => RegistryError::Validation(error),
            other => RegistryError::Store(other),
        }
    }

    pub fn unauthorized(actor: &UserId, action: Action) -> Self {
        RegistryError::Unauthorized {
            actor: actor.clone(),
            action,
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(error) => RegistryError::Validation(error),
            other => RegistryError::Store(other),
        }
    }
}
