mod config;
mod rules;

pub use config::{MatchingConfig, DEFAULT_REDONATION_INTERVAL_DAYS};

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use super::domain::{DonorFilter, DonorId, DonorProfile, RecipientRequest, RequestId};
use super::error::RegistryError;
use super::repository::ProfileStore;

/// Read-only engine computing eligible donors for a recipient request.
pub struct MatchingEngine<S: ?Sized> {
    store: Arc<S>,
    config: MatchingConfig,
}

impl<S> MatchingEngine<S>
where
    S: ProfileStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: MatchingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Whether `donor` is currently eligible for `request`.
    pub fn qualifies(&self, donor: &DonorProfile, request: &RecipientRequest) -> bool {
        request.has_requirement() && rules::satisfies(donor, request, &self.config)
    }

    /// Compatible, approved, available donors for `request`, evaluated as of `today`.
    ///
    /// A request without any requirement yields an empty result. Store failures are
    /// propagated and never reported as "no matches".
    pub fn find_matches(
        &self,
        request: &RecipientRequest,
        today: NaiveDate,
    ) -> Result<MatchResult, RegistryError> {
        if !request.has_requirement() {
            return Ok(MatchResult::empty(request.id, today));
        }

        let pool = self.store.filter_donors(&DonorFilter::eligible())?;
        let scanned = pool.len();

        let mut ranked: Vec<(bool, DonorProfile)> = pool
            .into_iter()
            .filter(|donor| rules::satisfies(donor, request, &self.config))
            .map(|donor| (rules::is_ready(&donor, today, &self.config), donor))
            .collect();
        ranked.sort_by(rules::rank);

        debug!(
            request = %request.id,
            scanned,
            matched = ranked.len(),
            "computed donor matches"
        );

        Ok(MatchResult {
            request_id: request.id,
            evaluated_on: today,
            candidates: ranked
                .into_iter()
                .map(|(ready, donor)| MatchCandidate { donor, ready })
                .collect(),
        })
    }
}

/// A matched donor and whether the re-donation interval has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub donor: DonorProfile,
    pub ready: bool,
}

/// Ordered, ephemeral list of donors satisfying a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub request_id: RequestId,
    pub evaluated_on: NaiveDate,
    pub candidates: Vec<MatchCandidate>,
}

impl MatchResult {
    pub fn empty(request_id: RequestId, evaluated_on: NaiveDate) -> Self {
        Self {
            request_id,
            evaluated_on,
            candidates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn donors(&self) -> impl Iterator<Item = &DonorProfile> {
        self.candidates.iter().map(|candidate| &candidate.donor)
    }

    pub fn contains(&self, donor: DonorId) -> bool {
        self.donors().any(|candidate| candidate.id == donor)
    }
}
