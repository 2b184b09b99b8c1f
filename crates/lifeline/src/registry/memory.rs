//! In-process store and user directory used by the service binary, the demo and tests.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};

use super::access::{AccessPolicy, Role};
use super::domain::{
    ApprovalStatus, DonorFilter, DonorId, DonorProfile, NewDonorProfile, NewRecipientRequest,
    RecipientRequest, RequestFilter, RequestId, RequestStatus, UserId,
};
use super::repository::{ProfileStore, StatusUpdate, StoreError};
use super::validation;

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::unavailable("store lock poisoned")
}

/// Rows keyed by id, each behind its own mutex so writes to distinct records never contend.
struct Table<T> {
    next_id: AtomicU64,
    rows: RwLock<BTreeMap<u64, Arc<Mutex<T>>>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn insert(&self, build: impl FnOnce(u64) -> T) -> Result<T, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let row = build(id);
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.insert(id, Arc::new(Mutex::new(row.clone())));
        Ok(row)
    }

    fn get(&self, id: u64) -> Result<Option<T>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        match rows.get(&id) {
            Some(row) => Ok(Some(row.lock().map_err(poisoned)?.clone())),
            None => Ok(None),
        }
    }

    fn select(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        let mut selected = Vec::new();
        for row in rows.values() {
            let row = row.lock().map_err(poisoned)?;
            if predicate(&row) {
                selected.push(row.clone());
            }
        }
        Ok(selected)
    }

    /// Run `apply` against one row while holding only that row's lock.
    fn modify(
        &self,
        id: u64,
        apply: impl FnOnce(&mut T) -> Result<(), StoreError>,
    ) -> Result<T, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        let row = rows.get(&id).ok_or(StoreError::NotFound)?;
        let mut row = row.lock().map_err(poisoned)?;
        let mut candidate = row.clone();
        apply(&mut candidate)?;
        *row = candidate.clone();
        Ok(candidate)
    }

    fn remove(&self, id: u64) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

/// Reference `ProfileStore` with compare-and-swap status writes.
pub struct InMemoryProfileStore {
    donors: Table<DonorProfile>,
    requests: Table<RecipientRequest>,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self {
            donors: Table::new(),
            requests: Table::new(),
        }
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn donor_conflict(expected: ApprovalStatus, found: ApprovalStatus) -> StoreError {
    StoreError::Conflict {
        expected: expected.label(),
        found: found.label(),
    }
}

fn request_conflict(expected: RequestStatus, found: RequestStatus) -> StoreError {
    StoreError::Conflict {
        expected: expected.label(),
        found: found.label(),
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn create_donor(&self, draft: NewDonorProfile) -> Result<DonorProfile, StoreError> {
        validation::check_new_donor(&draft)?;
        self.donors
            .insert(|id| DonorProfile::from_new(DonorId(id), draft))
    }

    fn donor(&self, id: DonorId) -> Result<Option<DonorProfile>, StoreError> {
        self.donors.get(id.0)
    }

    fn list_donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        self.donors.select(|_| true)
    }

    fn donors_by_owner(&self, owner: &UserId) -> Result<Vec<DonorProfile>, StoreError> {
        self.donors.select(|donor| &donor.owner_user_id == owner)
    }

    fn filter_donors(&self, filter: &DonorFilter) -> Result<Vec<DonorProfile>, StoreError> {
        self.donors.select(|donor| filter.matches(donor))
    }

    fn update_donor(&self, record: DonorProfile) -> Result<DonorProfile, StoreError> {
        validation::check_donor(&record)?;
        self.donors.modify(record.id.0, |stored| {
            if stored.approval_status != record.approval_status {
                return Err(donor_conflict(
                    record.approval_status,
                    stored.approval_status,
                ));
            }
            *stored = record;
            Ok(())
        })
    }

    fn update_donor_status(
        &self,
        id: DonorId,
        update: StatusUpdate<ApprovalStatus>,
    ) -> Result<DonorProfile, StoreError> {
        self.donors.modify(id.0, |stored| {
            if stored.approval_status != update.expected {
                return Err(donor_conflict(update.expected, stored.approval_status));
            }
            stored.approval_status = update.target;
            stored.updated_at = update.at;
            Ok(())
        })
    }

    fn record_donation(
        &self,
        id: DonorId,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<DonorProfile, StoreError> {
        self.donors.modify(id.0, |stored| {
            if stored.approval_status != ApprovalStatus::Approved {
                return Err(donor_conflict(
                    ApprovalStatus::Approved,
                    stored.approval_status,
                ));
            }
            if !stored.availability {
                return Err(StoreError::Conflict {
                    expected: "available",
                    found: "unavailable",
                });
            }
            stored.availability = false;
            stored.last_donation_date = Some(on);
            stored.updated_at = at;
            Ok(())
        })
    }

    fn delete_donor(&self, id: DonorId) -> Result<(), StoreError> {
        self.donors.remove(id.0)
    }

    fn create_request(&self, draft: NewRecipientRequest) -> Result<RecipientRequest, StoreError> {
        validation::check_new_request(&draft)?;
        self.requests
            .insert(|id| RecipientRequest::from_new(RequestId(id), draft))
    }

    fn request(&self, id: RequestId) -> Result<Option<RecipientRequest>, StoreError> {
        self.requests.get(id.0)
    }

    fn list_requests(&self) -> Result<Vec<RecipientRequest>, StoreError> {
        self.requests.select(|_| true)
    }

    fn requests_by_owner(&self, owner: &UserId) -> Result<Vec<RecipientRequest>, StoreError> {
        self.requests
            .select(|request| &request.owner_user_id == owner)
    }

    fn filter_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<RecipientRequest>, StoreError> {
        self.requests.select(|request| filter.matches(request))
    }

    fn update_request(&self, record: RecipientRequest) -> Result<RecipientRequest, StoreError> {
        validation::check_request(&record)?;
        self.requests.modify(record.id.0, |stored| {
            if stored.status != record.status {
                return Err(request_conflict(record.status, stored.status));
            }
            *stored = record;
            Ok(())
        })
    }

    fn update_request_status(
        &self,
        id: RequestId,
        update: StatusUpdate<RequestStatus>,
    ) -> Result<RecipientRequest, StoreError> {
        self.requests.modify(id.0, |stored| {
            if stored.status != update.expected {
                return Err(request_conflict(update.expected, stored.status));
            }
            stored.status = update.target;
            stored.updated_at = update.at;
            if update.resubmission {
                stored.resubmissions = stored.resubmissions.saturating_add(1);
            }
            Ok(())
        })
    }

    fn delete_request(&self, id: RequestId) -> Result<(), StoreError> {
        self.requests.remove(id.0)
    }
}

/// Role lookup for accounts registered in-process.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    roles: RwLock<HashMap<UserId, Role>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admins<I, U>(admins: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        let directory = Self::default();
        for admin in admins {
            directory.register(UserId::new(admin), Role::Admin);
        }
        directory
    }

    pub fn register(&self, user: UserId, role: Role) {
        self.roles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, role);
    }

    /// Register `user` only if the id is unknown. Returns `false` and leaves the existing
    /// role untouched otherwise.
    pub fn register_new(&self, user: UserId, role: Role) -> bool {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        match roles.entry(user) {
            Entry::Vacant(slot) => {
                slot.insert(role);
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

impl AccessPolicy for InMemoryUserDirectory {
    fn role_of(&self, actor: &UserId) -> Option<Role> {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor)
            .copied()
    }
}
