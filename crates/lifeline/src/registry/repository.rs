use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ApprovalStatus, DonorFilter, DonorId, DonorProfile, NewDonorProfile, NewRecipientRequest,
    RecipientRequest, RequestFilter, RequestId, RequestStatus, UserId,
};
use super::validation::ValidationError;

/// Conditional status write: applied only while the stored status equals `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate<S> {
    pub expected: S,
    pub target: S,
    pub at: DateTime<Utc>,
    /// Set when the write re-opens a rejected record, so the store can count resubmissions.
    pub resubmission: bool,
}

impl<S: Copy> StatusUpdate<S> {
    pub fn new(expected: S, target: S, at: DateTime<Utc>) -> Self {
        Self {
            expected,
            target,
            at,
            resubmission: false,
        }
    }

    pub fn as_resubmission(mut self) -> Self {
        self.resubmission = true;
        self
    }
}

/// Persistence boundary for donor profiles and recipient requests.
///
/// `update_*` replaces the whole record but only while the stored status still equals the
/// status carried by the replacement, so a full-record write can never undo a concurrent
/// review decision. `update_*_status` is the compare-and-swap the lifecycle manager relies on.
pub trait ProfileStore: Send + Sync {
    fn create_donor(&self, draft: NewDonorProfile) -> Result<DonorProfile, StoreError>;
    fn donor(&self, id: DonorId) -> Result<Option<DonorProfile>, StoreError>;
    fn list_donors(&self) -> Result<Vec<DonorProfile>, StoreError>;
    fn donors_by_owner(&self, owner: &UserId) -> Result<Vec<DonorProfile>, StoreError>;
    fn filter_donors(&self, filter: &DonorFilter) -> Result<Vec<DonorProfile>, StoreError>;
    fn update_donor(&self, record: DonorProfile) -> Result<DonorProfile, StoreError>;
    fn update_donor_status(
        &self,
        id: DonorId,
        update: StatusUpdate<ApprovalStatus>,
    ) -> Result<DonorProfile, StoreError>;
    /// Atomically withdraw an approved, available donor after a donation on `on`.
    /// Fails with `Conflict` when the donor is no longer approved and available.
    fn record_donation(
        &self,
        id: DonorId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<DonorProfile, StoreError>;
    fn delete_donor(&self, id: DonorId) -> Result<(), StoreError>;

    fn create_request(&self, draft: NewRecipientRequest) -> Result<RecipientRequest, StoreError>;
    fn request(&self, id: RequestId) -> Result<Option<RecipientRequest>, StoreError>;
    fn list_requests(&self) -> Result<Vec<RecipientRequest>, StoreError>;
    fn requests_by_owner(&self, owner: &UserId) -> Result<Vec<RecipientRequest>, StoreError>;
    fn filter_requests(&self, filter: &RequestFilter)
        -> Result<Vec<RecipientRequest>, StoreError>;
    fn update_request(&self, record: RecipientRequest) -> Result<RecipientRequest, StoreError>;
    fn update_request_status(
        &self,
        id: RequestId,
        update: StatusUpdate<RequestStatus>,
    ) -> Result<RecipientRequest, StoreError>;
    fn delete_request(&self, id: RequestId) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("stored status changed concurrently (expected {expected}, found {found})")]
    Conflict {
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
