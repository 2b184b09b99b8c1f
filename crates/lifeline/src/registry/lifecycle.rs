//! Review state machine for donor profiles and recipient requests.
//!
//! Every transition is a read followed by a compare-and-swap write at the store. A lost
//! swap is retried once against fresh state; a second loss surfaces as `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::access::Action;
use super::domain::{
    ApprovalStatus, DonorId, DonorProfile, RecipientRequest, RecordKind, RecordRef, RequestId,
    RequestStatus, UserId,
};
use super::error::RegistryError;
use super::events::{EventPublisher, StatusChange, StatusChangeEvent};
use super::repository::{ProfileStore, StatusUpdate, StoreError};

const MAX_ATTEMPTS: usize = 2;

/// Maximum number of times a rejected request may be reopened.
pub const MAX_REQUEST_RESUBMISSIONS: u8 = 1;

/// Legal donor edges. Self-loops are handled separately as no-ops.
pub fn donor_edge_permitted(from: ApprovalStatus, to: ApprovalStatus) -> bool {
    use ApprovalStatus::*;
    matches!(
        (from, to),
        (Pending, Approved) | (Pending, Rejected) | (Approved, Rejected) | (Rejected, Pending)
    )
}

/// Legal request edges given how often the request was already reopened.
pub fn request_edge_permitted(from: RequestStatus, to: RequestStatus, resubmissions: u8) -> bool {
    use RequestStatus::*;
    match (from, to) {
        (Pending, Approved)
        | (Pending, Rejected)
        | (Approved, Fulfilled)
        | (Approved, Rejected) => true,
        (Rejected, Pending) => resubmissions < MAX_REQUEST_RESUBMISSIONS,
        _ => false,
    }
}

/// A requested status change. `expected` is the status the caller last observed; when it
/// no longer matches the stored status the call fails with `Conflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionCommand {
    DonorProfile {
        id: DonorId,
        target: ApprovalStatus,
        #[serde(default)]
        expected: Option<ApprovalStatus>,
    },
    RecipientRequest {
        id: RequestId,
        target: RequestStatus,
        #[serde(default)]
        expected: Option<RequestStatus>,
    },
}

impl TransitionCommand {
    pub fn record(&self) -> RecordRef {
        match self {
            TransitionCommand::DonorProfile { id, .. } => RecordRef::Donor(*id),
            TransitionCommand::RecipientRequest { id, .. } => RecordRef::Request(*id),
        }
    }
}

/// Record state after a successful (or idempotent) transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum TransitionOutcome {
    DonorProfile(DonorProfile),
    RecipientRequest(RecipientRequest),
}

/// Authoritative owner of status changes.
pub struct LifecycleManager<S: ?Sized, P: ?Sized> {
    store: Arc<S>,
    events: Arc<P>,
}

impl<S, P> LifecycleManager<S, P>
where
    S: ProfileStore + ?Sized,
    P: EventPublisher + ?Sized,
{
    pub fn new(store: Arc<S>, events: Arc<P>) -> Self {
        Self { store, events }
    }

    /// Apply `command` on behalf of `actor`. Only reviewers (`is_admin`) may transition.
    pub fn transition(
        &self,
        command: TransitionCommand,
        actor: &UserId,
        is_admin: bool,
    ) -> Result<TransitionOutcome, RegistryError> {
        match command {
            TransitionCommand::DonorProfile {
                id,
                target,
                expected,
            } => self
                .transition_donor(id, target, expected, actor, is_admin)
                .map(TransitionOutcome::DonorProfile),
            TransitionCommand::RecipientRequest {
                id,
                target,
                expected,
            } => self
                .transition_request(id, target, expected, actor, is_admin)
                .map(TransitionOutcome::RecipientRequest),
        }
    }

    pub fn transition_donor(
        &self,
        id: DonorId,
        target: ApprovalStatus,
        expected: Option<ApprovalStatus>,
        actor: &UserId,
        is_admin: bool,
    ) -> Result<DonorProfile, RegistryError> {
        let record = RecordRef::Donor(id);
        if !is_admin {
            return Err(RegistryError::unauthorized(actor, Action::Review));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self
                .store
                .donor(id)
                .map_err(|error| RegistryError::from_store(record, error))?
                .ok_or(RegistryError::NotFound { record })?;
            let from = current.approval_status;

            if expected.is_some_and(|status| status != from) {
                return Err(RegistryError::Conflict { record });
            }
            if from == target {
                return Ok(current);
            }
            if !donor_edge_permitted(from, target) {
                return Err(RegistryError::IllegalTransition {
                    kind: RecordKind::DonorProfile,
                    from: from.label(),
                    to: target.label(),
                });
            }

            let update = StatusUpdate::new(from, target, Utc::now());
            match self.store.update_donor_status(id, update) {
                Ok(updated) => {
                    info!(
                        record = %record,
                        from = from.label(),
                        to = target.label(),
                        %actor,
                        "transition committed"
                    );
                    self.emit(
                        StatusChange::DonorProfile {
                            id,
                            from,
                            to: target,
                        },
                        actor,
                        update,
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { found, .. }) => {
                    debug!(record = %record, attempt, found, "status swap lost; reloading");
                }
                Err(error) => return Err(RegistryError::from_store(record, error)),
            }
        }

        Err(RegistryError::Conflict { record })
    }

    pub fn transition_request(
        &self,
        id: RequestId,
        target: RequestStatus,
        expected: Option<RequestStatus>,
        actor: &UserId,
        is_admin: bool,
    ) -> Result<RecipientRequest, RegistryError> {
        let record = RecordRef::Request(id);
        if !is_admin {
            return Err(RegistryError::unauthorized(actor, Action::Review));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self
                .store
                .request(id)
                .map_err(|error| RegistryError::from_store(record, error))?
                .ok_or(RegistryError::NotFound { record })?;
            let from = current.status;

            if expected.is_some_and(|status| status != from) {
                return Err(RegistryError::Conflict { record });
            }
            if from == target {
                return Ok(current);
            }
            if !request_edge_permitted(from, target, current.resubmissions) {
                return Err(RegistryError::IllegalTransition {
                    kind: RecordKind::RecipientRequest,
                    from: from.label(),
                    to: target.label(),
                });
            }

            let mut update = StatusUpdate::new(from, target, Utc::now());
            if from == RequestStatus::Rejected && target == RequestStatus::Pending {
                update = update.as_resubmission();
            }

            match self.store.update_request_status(id, update) {
                Ok(updated) => {
                    info!(
                        record = %record,
                        from = from.label(),
                        to = target.label(),
                        %actor,
                        "transition committed"
                    );
                    self.emit(
                        StatusChange::RecipientRequest {
                            id,
                            from,
                            to: target,
                        },
                        actor,
                        update,
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { found, .. }) => {
                    debug!(record = %record, attempt, found, "status swap lost; reloading");
                }
                Err(error) => return Err(RegistryError::from_store(record, error)),
            }
        }

        Err(RegistryError::Conflict { record })
    }

    fn emit<T>(&self, change: StatusChange, actor: &UserId, update: StatusUpdate<T>) {
        let event = StatusChangeEvent {
            change,
            actor: actor.clone(),
            at: update.at,
        };
        if let Err(error) = self.events.publish(event) {
            warn!(record = %change.record(), %error, "status change event dropped");
        }
    }
}
