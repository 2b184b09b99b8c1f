//! Donor and recipient registry: intake, eligibility matching and the review lifecycle.
//!
//! Every operation goes through [`RegistryService`], which composes the intake guard, the
//! matching engine and the lifecycle manager over a single [`ProfileStore`].

pub mod access;
pub mod compatibility;
pub mod domain;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod matching;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub(crate) mod validation;

#[cfg(test)]
mod tests;

pub use access::{authorize, AccessPolicy, Action, Role};
pub use compatibility::{blood_compatible, organ_compatible, BloodMatchMode};
pub use domain::{
    ApprovalStatus, BloodType, DonorFilter, DonorId, DonorProfile, DonorSubmission, Organ,
    RecipientRequest, RecipientSubmission, RecordKind, RecordRef, RequestFilter, RequestId,
    RequestStatus, UrgencyLevel, UserId,
};
pub use error::RegistryError;
pub use events::{BroadcastPublisher, EventError, EventPublisher, StatusChange, StatusChangeEvent};
pub use lifecycle::{LifecycleManager, TransitionCommand, TransitionOutcome};
pub use matching::{
    MatchCandidate, MatchResult, MatchingConfig, MatchingEngine, DEFAULT_REDONATION_INTERVAL_DAYS,
};
pub use memory::{InMemoryProfileStore, InMemoryUserDirectory};
pub use repository::{ProfileStore, StatusUpdate, StoreError};
pub use router::{registry_router, ACTOR_HEADER};
pub use service::{Fulfillment, RegistryService};
pub use validation::ValidationError;
