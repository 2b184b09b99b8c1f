use std::cmp::Ordering;

use chrono::NaiveDate;

use super::config::MatchingConfig;
use crate::registry::compatibility::organ_compatible;
use crate::registry::domain::{ApprovalStatus, DonorProfile, RecipientRequest};

/// Every requirement present on the request must be met; absent fields do not filter.
pub(crate) fn satisfies(
    donor: &DonorProfile,
    request: &RecipientRequest,
    config: &MatchingConfig,
) -> bool {
    if donor.approval_status != ApprovalStatus::Approved || !donor.availability {
        return false;
    }

    if let Some(needed) = request.blood_type_needed {
        match donor.blood_type {
            Some(offered) if config.blood_match_mode.permits(offered, needed) => {}
            _ => return false,
        }
    }

    if let Some(needed) = &request.organ_needed {
        match &donor.organ {
            Some(offered) if organ_compatible(offered, needed) => {}
            _ => return false,
        }
    }

    true
}

/// A donor is ready when they never donated or the re-donation interval has elapsed.
pub(crate) fn is_ready(donor: &DonorProfile, today: NaiveDate, config: &MatchingConfig) -> bool {
    match donor.last_donation_date {
        None => true,
        Some(last) => (today - last).num_days() >= i64::from(config.redonation_interval_days),
    }
}

/// Ready donors first, then newest profile first, then highest id first.
pub(crate) fn rank(left: &(bool, DonorProfile), right: &(bool, DonorProfile)) -> Ordering {
    let (left_ready, left_donor) = left;
    let (right_ready, right_donor) = right;

    right_ready
        .cmp(left_ready)
        .then_with(|| right_donor.created_at.cmp(&left_donor.created_at))
        .then_with(|| right_donor.id.cmp(&left_donor.id))
}
