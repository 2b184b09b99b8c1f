use std::sync::Arc;

use super::common::*;
use crate::registry::domain::{
    ApprovalStatus, BloodType, DonorId, RecordKind, RecordRef, RequestId, RequestStatus,
    UrgencyLevel,
};
use crate::registry::events::StatusChange;
use crate::registry::repository::{ProfileStore, StoreError};
use crate::registry::{
    Action, InMemoryProfileStore, LifecycleManager, RegistryError, TransitionCommand,
};

fn reject_request(service: &TestService, id: RequestId) -> Result<(), RegistryError> {
    service
        .transition(
            TransitionCommand::RecipientRequest {
                id,
                target: RequestStatus::Rejected,
                expected: None,
            },
            &admin(),
        )
        .map(|_| ())
}

fn reopen_request(service: &TestService, id: RequestId) -> Result<(), RegistryError> {
    service
        .transition(
            TransitionCommand::RecipientRequest {
                id,
                target: RequestStatus::Pending,
                expected: None,
            },
            &admin(),
        )
        .map(|_| ())
}

#[test]
fn approval_commits_and_emits_one_event() {
    let (service, _, events) = build_service();
    let created = service
        .create_donor_profile(&user(DONOR), donor_submission(Some(BloodType::BNegative), None))
        .expect("donor submitted");

    let approved = approve_donor(&service, created.id);

    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    let recorded = events.events();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].change,
        StatusChange::DonorProfile {
            id: created.id,
            from: ApprovalStatus::Pending,
            to: ApprovalStatus::Approved,
        }
    );
    assert_eq!(recorded[0].actor, admin());
}

#[test]
fn self_loops_are_silent_no_ops() {
    let (service, _, events) = build_service();
    let donor = approved_donor(&service, DONOR, Some(BloodType::ONegative), None);
    let before = events.events().len();

    let again = approve_donor(&service, donor.id);

    assert_eq!(again, donor);
    assert_eq!(events.events().len(), before);
}

#[test]
fn non_admins_cannot_transition() {
    let (service, store, events) = build_service();
    let created = service
        .create_recipient_request(
            &user(HOSPITAL),
            request_submission(Some(BloodType::APositive), None, UrgencyLevel::Critical),
        )
        .expect("request submitted");

    let command = TransitionCommand::RecipientRequest {
        id: created.id,
        target: RequestStatus::Approved,
        expected: None,
    };
    match service.transition(command, &user(HOSPITAL)) {
        Err(RegistryError::Unauthorized { action, .. }) => assert_eq!(action, Action::Review),
        other => panic!("expected unauthorized, got {other:?}"),
    }

    let stored = store.request(created.id).expect("read").expect("present");
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(events.events().is_empty());
}

#[test]
fn fulfilled_requests_are_terminal() {
    let (service, _, _) = build_service();
    let donor = approved_donor(&service, DONOR, Some(BloodType::ONegative), None);
    let request = approved_request(&service, Some(BloodType::ONegative), None);
    service
        .fulfill_request(&admin(), request.id, donor.id)
        .expect("fulfilled");

    for target in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
        let command = TransitionCommand::RecipientRequest {
            id: request.id,
            target,
            expected: None,
        };
        match service.transition(command, &admin()) {
            Err(RegistryError::IllegalTransition { kind, from, to }) => {
                assert_eq!(kind, RecordKind::RecipientRequest);
                assert_eq!(from, "FULFILLED");
                assert_eq!(to, target.label());
            }
            other => panic!("expected illegal transition, got {other:?}"),
        }
    }
}

#[test]
fn rejected_donors_must_be_resubmitted_before_approval() {
    let (service, _, _) = build_service();
    let created = service
        .create_donor_profile(&user(DONOR), donor_submission(Some(BloodType::APositive), None))
        .expect("donor submitted");
    service
        .transition(
            TransitionCommand::DonorProfile {
                id: created.id,
                target: ApprovalStatus::Rejected,
                expected: Some(ApprovalStatus::Pending),
            },
            &admin(),
        )
        .expect("rejected");

    let command = TransitionCommand::DonorProfile {
        id: created.id,
        target: ApprovalStatus::Approved,
        expected: None,
    };
    assert!(matches!(
        service.transition(command, &admin()),
        Err(RegistryError::IllegalTransition { .. })
    ));
}

#[test]
fn stale_expectation_is_a_conflict() {
    let (service, _, events) = build_service();
    let donor = approved_donor(&service, DONOR, Some(BloodType::APositive), None);
    let emitted = events.events().len();

    let command = TransitionCommand::DonorProfile {
        id: donor.id,
        target: ApprovalStatus::Rejected,
        expected: Some(ApprovalStatus::Pending),
    };
    match service.transition(command, &admin()) {
        Err(RegistryError::Conflict { record }) => assert_eq!(record, RecordRef::Donor(donor.id)),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(events.events().len(), emitted);
}

#[test]
fn requests_can_be_resubmitted_once() {
    let (service, store, _) = build_service();
    let created = service
        .create_recipient_request(
            &user(RECIPIENT),
            request_submission(None, Some("cornea"), UrgencyLevel::Low),
        )
        .expect("request submitted");

    reject_request(&service, created.id).expect("first rejection");
    reopen_request(&service, created.id).expect("first resubmission");
    let reopened = store.request(created.id).expect("read").expect("present");
    assert_eq!(reopened.status, RequestStatus::Pending);
    assert_eq!(reopened.resubmissions, 1);

    reject_request(&service, created.id).expect("second rejection");
    assert!(matches!(
        reopen_request(&service, created.id),
        Err(RegistryError::IllegalTransition { .. })
    ));
}

#[test]
fn missing_records_are_not_found() {
    let (service, _, _) = build_service();
    let command = TransitionCommand::DonorProfile {
        id: DonorId(404),
        target: ApprovalStatus::Approved,
        expected: None,
    };
    match service.transition(command, &admin()) {
        Err(RegistryError::NotFound { record }) => {
            assert_eq!(record, RecordRef::Donor(DonorId(404)))
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn lost_swap_is_retried_once_then_reported() {
    let store = Arc::new(ContendedStore::default());
    let draft = donor_draft(BloodType::OPositive, at(4), None);
    let donor = store.create_donor(draft).expect("donor stored");
    let events = Arc::new(RecordingPublisher::default());
    let manager = LifecycleManager::new(store.clone(), events.clone());

    let result = manager.transition_donor(
        donor.id,
        ApprovalStatus::Approved,
        None,
        &admin(),
        true,
    );

    match result {
        Err(RegistryError::Conflict { record }) => assert_eq!(record, RecordRef::Donor(donor.id)),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(store.swap_attempts(), 2);
    assert!(events.events().is_empty());
}

#[test]
fn publisher_failures_do_not_fail_transitions() {
    let store = Arc::new(InMemoryProfileStore::new());
    let donor = store
        .create_donor(donor_draft(BloodType::ANegative, at(5), None))
        .expect("donor stored");
    let manager = LifecycleManager::new(store.clone(), Arc::new(FailingPublisher));

    let approved = manager
        .transition_donor(donor.id, ApprovalStatus::Approved, None, &admin(), true)
        .expect("transition commits");

    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    let stored = store.donor(donor.id).expect("read").expect("present");
    assert_eq!(stored.approval_status, ApprovalStatus::Approved);
}

#[test]
fn store_outage_surfaces_as_store_error() {
    let manager = LifecycleManager::new(Arc::new(UnavailableStore), Arc::new(FailingPublisher));

    match manager.transition_request(RequestId(1), RequestStatus::Approved, None, &admin(), true) {
        Err(RegistryError::Store(StoreError::Unavailable(_))) => {}
        other => panic!("expected store failure, got {other:?}"),
    }
}
