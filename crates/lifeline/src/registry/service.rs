use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::access::{authorize, AccessPolicy, Action};
use super::domain::{
    ApprovalStatus, DonorFilter, DonorId, DonorProfile, DonorSubmission, RecipientRequest,
    RecipientSubmission, RecordKind, RecordRef, RequestFilter, RequestId, RequestStatus, UserId,
};
use super::error::RegistryError;
use super::events::EventPublisher;
use super::lifecycle::{LifecycleManager, TransitionCommand, TransitionOutcome};
use super::matching::{MatchResult, MatchingConfig, MatchingEngine};
use super::repository::{ProfileStore, StoreError};
use super::validation::{IntakeGuard, ValidationError};

const RESTORE_ATTEMPTS: usize = 2;

/// Facade composing intake validation, matching and the lifecycle manager over one store.
pub struct RegistryService<S, P, A> {
    store: Arc<S>,
    access: Arc<A>,
    guard: IntakeGuard,
    matching: MatchingEngine<S>,
    lifecycle: LifecycleManager<S, P>,
}

/// Request and donor state after a recorded fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fulfillment {
    pub request: RecipientRequest,
    pub donor: DonorProfile,
}

impl<S, P, A> RegistryService<S, P, A>
where
    S: ProfileStore + 'static,
    P: EventPublisher + 'static,
    A: AccessPolicy + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<P>, access: Arc<A>, config: MatchingConfig) -> Self {
        Self {
            matching: MatchingEngine::new(store.clone(), config),
            lifecycle: LifecycleManager::new(store.clone(), events),
            guard: IntakeGuard::new(),
            store,
            access,
        }
    }

    pub fn matching_config(&self) -> &MatchingConfig {
        self.matching.config()
    }

    fn require(&self, actor: &UserId, action: Action) -> Result<(), RegistryError> {
        if authorize(self.access.as_ref(), actor, action) {
            Ok(())
        } else {
            Err(RegistryError::unauthorized(actor, action))
        }
    }

    fn is_admin(&self, actor: &UserId) -> bool {
        self.access.is_admin(actor)
    }

    fn load_donor(&self, id: DonorId) -> Result<DonorProfile, RegistryError> {
        let record = RecordRef::Donor(id);
        self.store
            .donor(id)
            .map_err(|error| RegistryError::from_store(record, error))?
            .ok_or(RegistryError::NotFound { record })
    }

    fn load_request(&self, id: RequestId) -> Result<RecipientRequest, RegistryError> {
        let record = RecordRef::Request(id);
        self.store
            .request(id)
            .map_err(|error| RegistryError::from_store(record, error))?
            .ok_or(RegistryError::NotFound { record })
    }

    /// Register a new donor profile in `PENDING`.
    pub fn create_donor_profile(
        &self,
        actor: &UserId,
        submission: DonorSubmission,
    ) -> Result<DonorProfile, RegistryError> {
        self.require(actor, Action::SubmitDonorProfile)?;
        let draft = self
            .guard
            .donor_from_submission(actor.clone(), submission, Utc::now())?;
        let created = self.store.create_donor(draft)?;
        info!(record = %created.id, owner = %actor, "donor profile submitted");
        Ok(created)
    }

    /// Register a new recipient request in `PENDING`.
    pub fn create_recipient_request(
        &self,
        actor: &UserId,
        submission: RecipientSubmission,
    ) -> Result<RecipientRequest, RegistryError> {
        self.require(actor, Action::SubmitRecipientRequest)?;
        let draft = self
            .guard
            .request_from_submission(actor.clone(), submission, Utc::now())?;
        let created = self.store.create_request(draft)?;
        info!(record = %created.id, owner = %actor, "recipient request submitted");
        Ok(created)
    }

    /// Fetch a donor profile. Unapproved profiles are visible to their owner and admins only.
    pub fn donor_profile(
        &self,
        actor: &UserId,
        id: DonorId,
    ) -> Result<DonorProfile, RegistryError> {
        let donor = self.load_donor(id)?;
        if donor.approval_status == ApprovalStatus::Approved
            || &donor.owner_user_id == actor
            || self.is_admin(actor)
        {
            Ok(donor)
        } else {
            Err(RegistryError::unauthorized(actor, Action::ViewRecord))
        }
    }

    /// Fetch a recipient request. Unapproved requests are visible to their owner and admins only.
    pub fn recipient_request(
        &self,
        actor: &UserId,
        id: RequestId,
    ) -> Result<RecipientRequest, RegistryError> {
        let request = self.load_request(id)?;
        if request.status == RequestStatus::Approved
            || &request.owner_user_id == actor
            || self.is_admin(actor)
        {
            Ok(request)
        } else {
            Err(RegistryError::unauthorized(actor, Action::ViewRecord))
        }
    }

    /// Owner edit of a donor profile that is still awaiting review.
    pub fn update_donor_profile(
        &self,
        actor: &UserId,
        id: DonorId,
        submission: DonorSubmission,
    ) -> Result<DonorProfile, RegistryError> {
        let existing = self.load_donor(id)?;
        if &existing.owner_user_id != actor {
            return Err(RegistryError::unauthorized(actor, Action::EditOwnRecord));
        }
        let revised = self.guard.revise_donor(&existing, submission, Utc::now())?;
        self.store
            .update_donor(revised)
            .map_err(|error| RegistryError::from_store(RecordRef::Donor(id), error))
    }

    /// Owner edit of a recipient request that is still awaiting review.
    pub fn update_recipient_request(
        &self,
        actor: &UserId,
        id: RequestId,
        submission: RecipientSubmission,
    ) -> Result<RecipientRequest, RegistryError> {
        let existing = self.load_request(id)?;
        if &existing.owner_user_id != actor {
            return Err(RegistryError::unauthorized(actor, Action::EditOwnRecord));
        }
        let revised = self
            .guard
            .revise_request(&existing, submission, Utc::now())?;
        self.store
            .update_request(revised)
            .map_err(|error| RegistryError::from_store(RecordRef::Request(id), error))
    }

    /// Toggle a donor's willingness to donate. Allowed for the owner and admins at any status.
    pub fn set_availability(
        &self,
        actor: &UserId,
        id: DonorId,
        available: bool,
    ) -> Result<DonorProfile, RegistryError> {
        let existing = self.load_donor(id)?;
        if &existing.owner_user_id != actor && !self.is_admin(actor) {
            return Err(RegistryError::unauthorized(actor, Action::EditOwnRecord));
        }
        if existing.availability == available {
            return Ok(existing);
        }

        let updated = DonorProfile {
            availability: available,
            updated_at: Utc::now(),
            ..existing
        };
        self.store
            .update_donor(updated)
            .map_err(|error| RegistryError::from_store(RecordRef::Donor(id), error))
    }

    /// Eligible donors for a stored request, evaluated as of today.
    pub fn find_matches(&self, request_id: RequestId) -> Result<MatchResult, RegistryError> {
        self.find_matches_on(request_id, Utc::now().date_naive())
    }

    /// Rejected and fulfilled requests need no donor and always yield an empty result.
    pub fn find_matches_on(
        &self,
        request_id: RequestId,
        today: NaiveDate,
    ) -> Result<MatchResult, RegistryError> {
        let request = self.load_request(request_id)?;
        self.matches_on(&request, today)
    }

    /// Matches for a request `actor` is allowed to view, per [`Self::recipient_request`].
    pub fn matches_for(
        &self,
        actor: &UserId,
        request_id: RequestId,
    ) -> Result<MatchResult, RegistryError> {
        let request = self.recipient_request(actor, request_id)?;
        self.matches_on(&request, Utc::now().date_naive())
    }

    fn matches_on(
        &self,
        request: &RecipientRequest,
        today: NaiveDate,
    ) -> Result<MatchResult, RegistryError> {
        if matches!(
            request.status,
            RequestStatus::Rejected | RequestStatus::Fulfilled
        ) {
            return Ok(MatchResult::empty(request.id, today));
        }
        self.matching.find_matches(request, today)
    }

    /// Review transition on behalf of `actor`; see [`LifecycleManager::transition`].
    pub fn transition(
        &self,
        command: TransitionCommand,
        actor: &UserId,
    ) -> Result<TransitionOutcome, RegistryError> {
        self.lifecycle
            .transition(command, actor, self.is_admin(actor))
    }

    /// Fulfil an approved request with a specific donor and record the donation.
    ///
    /// The donor is withdrawn first with a conditional write, so a donor claimed or
    /// revoked concurrently fails the call with `Conflict` before the request changes.
    /// If the request transition then fails, the donor's availability and last donation
    /// date are put back; a donor that cannot be restored yields `RollbackFailed`.
    pub fn fulfill_request(
        &self,
        actor: &UserId,
        request_id: RequestId,
        donor_id: DonorId,
    ) -> Result<Fulfillment, RegistryError> {
        self.require(actor, Action::Review)?;

        let request = self.load_request(request_id)?;
        if request.status != RequestStatus::Approved {
            return Err(RegistryError::IllegalTransition {
                kind: RecordKind::RecipientRequest,
                from: request.status.label(),
                to: RequestStatus::Fulfilled.label(),
            });
        }

        let donor = self.load_donor(donor_id)?;
        if donor.approval_status != ApprovalStatus::Approved || !donor.availability {
            return Err(ValidationError::DonorUnavailable { donor: donor_id }.into());
        }
        if !self.matching.qualifies(&donor, &request) {
            return Err(ValidationError::IncompatibleDonor {
                donor: donor_id,
                request: request_id,
            }
            .into());
        }

        let now = Utc::now();
        let withdrawn = self
            .store
            .record_donation(donor_id, now.date_naive(), now)
            .map_err(|error| RegistryError::from_store(RecordRef::Donor(donor_id), error))?;

        let fulfilled = match self.lifecycle.transition_request(
            request_id,
            RequestStatus::Fulfilled,
            Some(RequestStatus::Approved),
            actor,
            true,
        ) {
            Ok(fulfilled) => fulfilled,
            Err(error) => {
                if let Err(rollback) = self.restore_donor(&donor) {
                    warn!(
                        request = %request_id,
                        donor = %donor_id,
                        %error,
                        %rollback,
                        "fulfillment aborted with the donor still withdrawn"
                    );
                    return Err(rollback);
                }
                return Err(error);
            }
        };

        info!(request = %request_id, donor = %donor_id, %actor, "request fulfilled");
        Ok(Fulfillment {
            request: fulfilled,
            donor: withdrawn,
        })
    }

    /// Reapply `previous` availability and donation date onto the freshly read donor.
    fn restore_donor(&self, previous: &DonorProfile) -> Result<(), RegistryError> {
        let record = RecordRef::Donor(previous.id);
        let failed = |reason: String| RegistryError::RollbackFailed { record, reason };

        let mut last_conflict = String::new();
        for attempt in 1..=RESTORE_ATTEMPTS {
            let current = match self.store.donor(previous.id) {
                Ok(Some(current)) => current,
                // Deleted meanwhile; nothing left to restore.
                Ok(None) => return Ok(()),
                Err(error) => return Err(failed(error.to_string())),
            };
            let restored = DonorProfile {
                availability: previous.availability,
                last_donation_date: previous.last_donation_date,
                updated_at: Utc::now(),
                ..current
            };
            match self.store.update_donor(restored) {
                Ok(_) => {
                    info!(
                        donor = %previous.id,
                        attempt,
                        "donor restored after aborted fulfillment"
                    );
                    return Ok(());
                }
                Err(error @ StoreError::Conflict { .. }) => last_conflict = error.to_string(),
                Err(error) => return Err(failed(error.to_string())),
            }
        }
        Err(failed(last_conflict))
    }

    /// Donors matching `filter`. Non-admins only ever see approved profiles.
    pub fn list_donors(
        &self,
        actor: &UserId,
        filter: DonorFilter,
    ) -> Result<Vec<DonorProfile>, RegistryError> {
        let filter = if self.is_admin(actor) {
            filter
        } else {
            DonorFilter {
                approval_status: Some(ApprovalStatus::Approved),
                ..filter
            }
        };

        let mut donors = self.store.filter_donors(&filter)?;
        sort_donors(&mut donors);
        Ok(donors)
    }

    /// Requests matching `filter`, most urgent first. Non-admins only ever see approved requests.
    pub fn list_requests(
        &self,
        actor: &UserId,
        filter: RequestFilter,
    ) -> Result<Vec<RecipientRequest>, RegistryError> {
        let filter = if self.is_admin(actor) {
            filter
        } else {
            RequestFilter {
                status: Some(RequestStatus::Approved),
                ..filter
            }
        };

        let mut requests = self.store.filter_requests(&filter)?;
        sort_requests(&mut requests);
        Ok(requests)
    }

    /// The actor's own donor profiles, whatever their status.
    pub fn list_my_donor_profiles(
        &self,
        actor: &UserId,
    ) -> Result<Vec<DonorProfile>, RegistryError> {
        let mut donors = self.store.donors_by_owner(actor)?;
        sort_donors(&mut donors);
        Ok(donors)
    }

    /// The actor's own recipient requests, whatever their status.
    pub fn list_my_requests(&self, actor: &UserId) -> Result<Vec<RecipientRequest>, RegistryError> {
        let mut requests = self.store.requests_by_owner(actor)?;
        sort_requests(&mut requests);
        Ok(requests)
    }

    pub fn delete_donor_profile(&self, actor: &UserId, id: DonorId) -> Result<(), RegistryError> {
        self.require(actor, Action::Administer)?;
        self.store
            .delete_donor(id)
            .map_err(|error| RegistryError::from_store(RecordRef::Donor(id), error))?;
        info!(record = %id, %actor, "donor profile deleted");
        Ok(())
    }

    pub fn delete_recipient_request(
        &self,
        actor: &UserId,
        id: RequestId,
    ) -> Result<(), RegistryError> {
        self.require(actor, Action::Administer)?;
        self.store
            .delete_request(id)
            .map_err(|error| RegistryError::from_store(RecordRef::Request(id), error))?;
        info!(record = %id, %actor, "recipient request deleted");
        Ok(())
    }

    /// Owner of a stored record.
    pub fn owner_of(&self, record: RecordRef) -> Result<UserId, RegistryError> {
        match record {
            RecordRef::Donor(id) => self.load_donor(id).map(|donor| donor.owner_user_id),
            RecordRef::Request(id) => self.load_request(id).map(|request| request.owner_user_id),
        }
    }
}

fn sort_donors(donors: &mut [DonorProfile]) {
    donors.sort_by_key(|donor| (Reverse(donor.created_at), Reverse(donor.id)));
}

fn sort_requests(requests: &mut [RecipientRequest]) {
    requests.sort_by_key(|request| {
        (
            Reverse(request.urgency_level),
            Reverse(request.created_at),
            Reverse(request.id),
        )
    });
}
