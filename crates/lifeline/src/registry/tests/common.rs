use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::registry::access::Role;
use crate::registry::domain::{
    ApprovalStatus, BloodType, DonorFilter, DonorId, DonorProfile, DonorSubmission,
    NewDonorProfile, NewRecipientRequest, RecipientRequest, RecipientSubmission, RequestFilter,
    RequestId, RequestStatus, UrgencyLevel, UserId,
};
use crate::registry::events::{EventError, EventPublisher, StatusChangeEvent};
use crate::registry::lifecycle::TransitionCommand;
use crate::registry::memory::{InMemoryProfileStore, InMemoryUserDirectory};
use crate::registry::repository::{ProfileStore, StatusUpdate, StoreError};
use crate::registry::{registry_router, MatchingConfig, RegistryService};

pub(super) const ADMIN: &str = "admin";
pub(super) const DONOR: &str = "dana";
pub(super) const SECOND_DONOR: &str = "devon";
pub(super) const RECIPIENT: &str = "rita";
pub(super) const HOSPITAL: &str = "st-luke";

pub(super) type TestService =
    RegistryService<InMemoryProfileStore, RecordingPublisher, InMemoryUserDirectory>;

pub(super) fn user(name: &str) -> UserId {
    UserId::new(name)
}

pub(super) fn admin() -> UserId {
    user(ADMIN)
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn directory() -> InMemoryUserDirectory {
    let directory = InMemoryUserDirectory::with_admins([ADMIN]);
    directory.register(user(DONOR), Role::Donor);
    directory.register(user(SECOND_DONOR), Role::Donor);
    directory.register(user(RECIPIENT), Role::Recipient);
    directory.register(user(HOSPITAL), Role::Hospital);
    directory
}

pub(super) fn build_service_with(
    config: MatchingConfig,
) -> (TestService, Arc<InMemoryProfileStore>, Arc<RecordingPublisher>) {
    let store = Arc::new(InMemoryProfileStore::new());
    let events = Arc::new(RecordingPublisher::default());
    let service = RegistryService::new(
        store.clone(),
        events.clone(),
        Arc::new(directory()),
        config,
    );
    (service, store, events)
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryProfileStore>, Arc<RecordingPublisher>)
{
    build_service_with(MatchingConfig::default())
}

pub(super) fn donor_submission(
    blood_type: Option<BloodType>,
    organ: Option<&str>,
) -> DonorSubmission {
    DonorSubmission {
        blood_type,
        organ: organ.map(str::to_string),
        location: "Des Moines".to_string(),
        contact_info: "555-0100".to_string(),
        availability: true,
        last_donation_date: None,
    }
}

pub(super) fn request_submission(
    blood_type_needed: Option<BloodType>,
    organ_needed: Option<&str>,
    urgency_level: UrgencyLevel,
) -> RecipientSubmission {
    RecipientSubmission {
        blood_type_needed,
        organ_needed: organ_needed.map(str::to_string),
        location: "Iowa City".to_string(),
        contact_info: "555-0199".to_string(),
        urgency_level,
        medical_condition: "post-operative anemia".to_string(),
        hospital_id: Some("UIHC".to_string()),
        request_date: None,
    }
}

pub(super) fn approve_donor(service: &TestService, id: DonorId) -> DonorProfile {
    let command = TransitionCommand::DonorProfile {
        id,
        target: ApprovalStatus::Approved,
        expected: None,
    };
    match service.transition(command, &admin()) {
        Ok(crate::registry::TransitionOutcome::DonorProfile(donor)) => donor,
        other => panic!("expected approved donor, got {other:?}"),
    }
}

pub(super) fn approve_request(service: &TestService, id: RequestId) -> RecipientRequest {
    let command = TransitionCommand::RecipientRequest {
        id,
        target: RequestStatus::Approved,
        expected: None,
    };
    match service.transition(command, &admin()) {
        Ok(crate::registry::TransitionOutcome::RecipientRequest(request)) => request,
        other => panic!("expected approved request, got {other:?}"),
    }
}

pub(super) fn approved_donor(
    service: &TestService,
    owner: &str,
    blood_type: Option<BloodType>,
    organ: Option<&str>,
) -> DonorProfile {
    let created = service
        .create_donor_profile(&user(owner), donor_submission(blood_type, organ))
        .expect("donor submitted");
    approve_donor(service, created.id)
}

pub(super) fn approved_request(
    service: &TestService,
    blood_type: Option<BloodType>,
    organ: Option<&str>,
) -> RecipientRequest {
    let created = service
        .create_recipient_request(
            &user(RECIPIENT),
            request_submission(blood_type, organ, UrgencyLevel::High),
        )
        .expect("request submitted");
    approve_request(service, created.id)
}

/// Donor draft with explicit timestamps, inserted straight into the store.
pub(super) fn donor_draft(
    blood_type: BloodType,
    created_at: DateTime<Utc>,
    last_donation_date: Option<NaiveDate>,
) -> NewDonorProfile {
    NewDonorProfile {
        owner_user_id: user(DONOR),
        blood_type: Some(blood_type),
        organ: None,
        location: "Ames".to_string(),
        contact_info: "555-0123".to_string(),
        availability: true,
        last_donation_date,
        created_at,
    }
}

pub(super) fn stored_approved_donor(
    store: &InMemoryProfileStore,
    draft: NewDonorProfile,
) -> DonorProfile {
    let created = store.create_donor(draft).expect("donor stored");
    store
        .update_donor_status(
            created.id,
            StatusUpdate::new(ApprovalStatus::Pending, ApprovalStatus::Approved, Utc::now()),
        )
        .expect("donor approved")
}

pub(super) fn request_draft(
    blood_type_needed: Option<BloodType>,
    organ_needed: Option<crate::registry::Organ>,
) -> NewRecipientRequest {
    NewRecipientRequest {
        owner_user_id: user(RECIPIENT),
        blood_type_needed,
        organ_needed,
        location: "Iowa City".to_string(),
        contact_info: "555-0199".to_string(),
        urgency_level: UrgencyLevel::Critical,
        medical_condition: String::new(),
        hospital_id: None,
        request_date: today(),
        created_at: at(1),
    }
}

pub(super) fn recipient_request(
    blood_type_needed: Option<BloodType>,
    organ_needed: Option<crate::registry::Organ>,
) -> RecipientRequest {
    RecipientRequest::from_new(RequestId(99), request_draft(blood_type_needed, organ_needed))
}

pub(super) fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date - Duration::days(days)
}

#[derive(Default)]
pub(super) struct RecordingPublisher {
    events: Mutex<Vec<StatusChangeEvent>>,
}

impl RecordingPublisher {
    pub(super) fn events(&self) -> Vec<StatusChangeEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: StatusChangeEvent) -> Result<(), EventError> {
        self.events.lock().expect("event mutex poisoned").push(event);
        Ok(())
    }
}

pub(super) struct FailingPublisher;

impl EventPublisher for FailingPublisher {
    fn publish(&self, _event: StatusChangeEvent) -> Result<(), EventError> {
        Err(EventError::Transport("audit sink offline".to_string()))
    }
}

fn offline() -> StoreError {
    StoreError::unavailable("database offline")
}

pub(super) struct UnavailableStore;

impl ProfileStore for UnavailableStore {
    fn create_donor(&self, _draft: NewDonorProfile) -> Result<DonorProfile, StoreError> {
        Err(offline())
    }

    fn donor(&self, _id: DonorId) -> Result<Option<DonorProfile>, StoreError> {
        Err(offline())
    }

    fn list_donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        Err(offline())
    }

    fn donors_by_owner(&self, _owner: &UserId) -> Result<Vec<DonorProfile>, StoreError> {
        Err(offline())
    }

    fn filter_donors(&self, _filter: &DonorFilter) -> Result<Vec<DonorProfile>, StoreError> {
        Err(offline())
    }

    fn update_donor(&self, _record: DonorProfile) -> Result<DonorProfile, StoreError> {
        Err(offline())
    }

    fn update_donor_status(
        &self,
        _id: DonorId,
        _update: StatusUpdate<ApprovalStatus>,
    ) -> Result<DonorProfile, StoreError> {
        Err(offline())
    }

    fn record_donation(
        &self,
        _id: DonorId,
        _on: NaiveDate,
        _at: DateTime<Utc>,
    ) -> Result<DonorProfile, StoreError> {
        Err(offline())
    }

    fn delete_donor(&self, _id: DonorId) -> Result<(), StoreError> {
        Err(offline())
    }

    fn create_request(&self, _draft: NewRecipientRequest) -> Result<RecipientRequest, StoreError> {
        Err(offline())
    }

    fn request(&self, _id: RequestId) -> Result<Option<RecipientRequest>, StoreError> {
        Err(offline())
    }

    fn list_requests(&self) -> Result<Vec<RecipientRequest>, StoreError> {
        Err(offline())
    }

    fn requests_by_owner(&self, _owner: &UserId) -> Result<Vec<RecipientRequest>, StoreError> {
        Err(offline())
    }

    fn filter_requests(
        &self,
        _filter: &RequestFilter,
    ) -> Result<Vec<RecipientRequest>, StoreError> {
        Err(offline())
    }

    fn update_request(&self, _record: RecipientRequest) -> Result<RecipientRequest, StoreError> {
        Err(offline())
    }

    fn update_request_status(
        &self,
        _id: RequestId,
        _update: StatusUpdate<RequestStatus>,
    ) -> Result<RecipientRequest, StoreError> {
        Err(offline())
    }

    fn delete_request(&self, _id: RequestId) -> Result<(), StoreError> {
        Err(offline())
    }
}

/// Store whose status swaps always lose, as if another reviewer kept winning the race.
#[derive(Default)]
pub(super) struct ContendedStore {
    pub(super) inner: InMemoryProfileStore,
    pub(super) swap_attempts: Mutex<usize>,
    /// Also lose every full donor write.
    pub(super) frozen_donors: bool,
}

impl ContendedStore {
    fn lose_swap(&self, found: &'static str) -> StoreError {
        *self.swap_attempts.lock().expect("attempt mutex poisoned") += 1;
        StoreError::Conflict {
            expected: "PENDING",
            found,
        }
    }

    pub(super) fn swap_attempts(&self) -> usize {
        *self.swap_attempts.lock().expect("attempt mutex poisoned")
    }
}

impl ProfileStore for ContendedStore {
    fn create_donor(&self, draft: NewDonorProfile) -> Result<DonorProfile, StoreError> {
        self.inner.create_donor(draft)
    }

    fn donor(&self, id: DonorId) -> Result<Option<DonorProfile>, StoreError> {
        self.inner.donor(id)
    }

    fn list_donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        self.inner.list_donors()
    }

    fn donors_by_owner(&self, owner: &UserId) -> Result<Vec<DonorProfile>, StoreError> {
        self.inner.donors_by_owner(owner)
    }

    fn filter_donors(&self, filter: &DonorFilter) -> Result<Vec<DonorProfile>, StoreError> {
        self.inner.filter_donors(filter)
    }

    fn update_donor(&self, record: DonorProfile) -> Result<DonorProfile, StoreError> {
        if self.frozen_donors {
            return Err(self.lose_swap("REJECTED"));
        }
        self.inner.update_donor(record)
    }

    fn update_donor_status(
        &self,
        _id: DonorId,
        _update: StatusUpdate<ApprovalStatus>,
    ) -> Result<DonorProfile, StoreError> {
        Err(self.lose_swap("PENDING"))
    }

    fn record_donation(
        &self,
        id: DonorId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<DonorProfile, StoreError> {
        self.inner.record_donation(id, on, at)
    }

    fn delete_donor(&self, id: DonorId) -> Result<(), StoreError> {
        self.inner.delete_donor(id)
    }

    fn create_request(&self, draft: NewRecipientRequest) -> Result<RecipientRequest, StoreError> {
        self.inner.create_request(draft)
    }

    fn request(&self, id: RequestId) -> Result<Option<RecipientRequest>, StoreError> {
        self.inner.request(id)
    }

    fn list_requests(&self) -> Result<Vec<RecipientRequest>, StoreError> {
        self.inner.list_requests()
    }

    fn requests_by_owner(&self, owner: &UserId) -> Result<Vec<RecipientRequest>, StoreError> {
        self.inner.requests_by_owner(owner)
    }

    fn filter_requests(&self, filter: &RequestFilter) -> Result<Vec<RecipientRequest>, StoreError> {
        self.inner.filter_requests(filter)
    }

    fn update_request(&self, record: RecipientRequest) -> Result<RecipientRequest, StoreError> {
        self.inner.update_request(record)
    }

    fn update_request_status(
        &self,
        _id: RequestId,
        _update: StatusUpdate<RequestStatus>,
    ) -> Result<RecipientRequest, StoreError> {
        Err(self.lose_swap("PENDING"))
    }

    fn delete_request(&self, id: RequestId) -> Result<(), StoreError> {
        self.inner.delete_request(id)
    }
}

pub(super) type ContendedService =
    RegistryService<ContendedStore, RecordingPublisher, InMemoryUserDirectory>;

/// Service over a store whose status swaps always lose, seeded with an approved O- donor
/// who last gave blood 200 days ago and an approved AB+ request.
pub(super) fn contended_fulfillment(
    store: ContendedStore,
) -> (ContendedService, Arc<ContendedStore>, DonorProfile, RecipientRequest) {
    let store = Arc::new(store);
    let donor = stored_approved_donor(
        &store.inner,
        donor_draft(BloodType::ONegative, at(3), Some(days_before(today(), 200))),
    );
    let created = store
        .inner
        .create_request(request_draft(Some(BloodType::AbPositive), None))
        .expect("request stored");
    let request = store
        .inner
        .update_request_status(
            created.id,
            StatusUpdate::new(RequestStatus::Pending, RequestStatus::Approved, Utc::now()),
        )
        .expect("request approved");
    let service = RegistryService::new(
        store.clone(),
        Arc::new(RecordingPublisher::default()),
        Arc::new(directory()),
        MatchingConfig::default(),
    );
    (service, store, donor, request)
}

pub(super) fn registry_router_with_service(service: TestService) -> axum::Router {
    registry_router(Arc::new(service))
}

pub(super) fn assert_conflict_response(response: &Response) {
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
