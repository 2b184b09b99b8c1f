use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ApprovalStatus, BloodType, DonorId, DonorProfile, DonorSubmission, NewDonorProfile,
    NewRecipientRequest, Organ, RecipientRequest, RecipientSubmission, RequestId, RequestStatus,
    UserId,
};

/// Validation errors raised while accepting or storing records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("donor profile must offer a blood type or an organ")]
    MissingDonation,
    #[error("recipient request must need a blood type or an organ")]
    MissingRequirement,
    #[error("last donation date {date} lies in the future")]
    FutureDonationDate { date: NaiveDate },
    #[error("record is locked after review (status {status})")]
    RecordLocked { status: &'static str },
    #[error("{donor} cannot satisfy the requirement of {request}")]
    IncompatibleDonor { donor: DonorId, request: RequestId },
    #[error("{donor} is not approved and available to donate")]
    DonorUnavailable { donor: DonorId },
}

fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField { field });
    }
    Ok(trimmed.to_string())
}

fn optional_organ(raw: Option<&str>) -> Option<Organ> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Organ::parse)
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Field invariants shared by drafts and stored donor profiles.
pub fn check_donor_fields(
    blood_type: Option<BloodType>,
    organ: Option<&Organ>,
    location: &str,
    contact_info: &str,
) -> Result<(), ValidationError> {
    if blood_type.is_none() && organ.is_none() {
        return Err(ValidationError::MissingDonation);
    }
    required_text("location", location)?;
    required_text("contact_info", contact_info)?;
    Ok(())
}

/// Field invariants shared by drafts and stored recipient requests.
pub fn check_request_fields(
    blood_type_needed: Option<BloodType>,
    organ_needed: Option<&Organ>,
    location: &str,
    contact_info: &str,
) -> Result<(), ValidationError> {
    if blood_type_needed.is_none() && organ_needed.is_none() {
        return Err(ValidationError::MissingRequirement);
    }
    required_text("location", location)?;
    required_text("contact_info", contact_info)?;
    Ok(())
}

pub fn check_new_donor(draft: &NewDonorProfile) -> Result<(), ValidationError> {
    check_donor_fields(
        draft.blood_type,
        draft.organ.as_ref(),
        &draft.location,
        &draft.contact_info,
    )
}

pub fn check_donor(record: &DonorProfile) -> Result<(), ValidationError> {
    check_donor_fields(
        record.blood_type,
        record.organ.as_ref(),
        &record.location,
        &record.contact_info,
    )
}

pub fn check_new_request(draft: &NewRecipientRequest) -> Result<(), ValidationError> {
    check_request_fields(
        draft.blood_type_needed,
        draft.organ_needed.as_ref(),
        &draft.location,
        &draft.contact_info,
    )
}

pub fn check_request(record: &RecipientRequest) -> Result<(), ValidationError> {
    check_request_fields(
        record.blood_type_needed,
        record.organ_needed.as_ref(),
        &record.location,
        &record.contact_info,
    )
}

/// Turns owner submissions into sanitized drafts and applies owner edits.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard;

impl IntakeGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn donor_from_submission(
        &self,
        owner: UserId,
        submission: DonorSubmission,
        now: DateTime<Utc>,
    ) -> Result<NewDonorProfile, ValidationError> {
        let organ = optional_organ(submission.organ.as_deref());
        check_donor_fields(
            submission.blood_type,
            organ.as_ref(),
            &submission.location,
            &submission.contact_info,
        )?;

        if let Some(date) = submission.last_donation_date {
            if date > now.date_naive() {
                return Err(ValidationError::FutureDonationDate { date });
            }
        }

        Ok(NewDonorProfile {
            owner_user_id: owner,
            blood_type: submission.blood_type,
            organ,
            location: required_text("location", &submission.location)?,
            contact_info: required_text("contact_info", &submission.contact_info)?,
            availability: submission.availability,
            last_donation_date: submission.last_donation_date,
            created_at: now,
        })
    }

    pub fn request_from_submission(
        &self,
        owner: UserId,
        submission: RecipientSubmission,
        now: DateTime<Utc>,
    ) -> Result<NewRecipientRequest, ValidationError> {
        let organ_needed = optional_organ(submission.organ_needed.as_deref());
        check_request_fields(
            submission.blood_type_needed,
            organ_needed.as_ref(),
            &submission.location,
            &submission.contact_info,
        )?;

        Ok(NewRecipientRequest {
            owner_user_id: owner,
            blood_type_needed: submission.blood_type_needed,
            organ_needed,
            location: required_text("location", &submission.location)?,
            contact_info: required_text("contact_info", &submission.contact_info)?,
            urgency_level: submission.urgency_level,
            medical_condition: submission.medical_condition.trim().to_string(),
            hospital_id: optional_text(submission.hospital_id),
            request_date: submission.request_date.unwrap_or_else(|| now.date_naive()),
            created_at: now,
        })
    }

    /// Apply an owner edit to a profile that has not been reviewed yet.
    pub fn revise_donor(
        &self,
        existing: &DonorProfile,
        submission: DonorSubmission,
        now: DateTime<Utc>,
    ) -> Result<DonorProfile, ValidationError> {
        if existing.approval_status != ApprovalStatus::Pending {
            return Err(ValidationError::RecordLocked {
                status: existing.approval_status.label(),
            });
        }

        let draft = self.donor_from_submission(existing.owner_user_id.clone(), submission, now)?;
        Ok(DonorProfile {
            blood_type: draft.blood_type,
            organ: draft.organ,
            location: draft.location,
            contact_info: draft.contact_info,
            availability: draft.availability,
            last_donation_date: draft.last_donation_date,
            updated_at: now,
            ..existing.clone()
        })
    }

    /// Apply an owner edit to a request that has not been reviewed yet.
    pub fn revise_request(
        &self,
        existing: &RecipientRequest,
        submission: RecipientSubmission,
        now: DateTime<Utc>,
    ) -> Result<RecipientRequest, ValidationError> {
        if existing.status != RequestStatus::Pending {
            return Err(ValidationError::RecordLocked {
                status: existing.status.label(),
            });
        }

        let request_date = submission.request_date.unwrap_or(existing.request_date);
        let draft = self.request_from_submission(existing.owner_user_id.clone(), submission, now)?;
        Ok(RecipientRequest {
            blood_type_needed: draft.blood_type_needed,
            organ_needed: draft.organ_needed,
            location: draft.location,
            contact_info: draft.contact_info,
            urgency_level: draft.urgency_level,
            medical_condition: draft.medical_condition,
            hospital_id: draft.hospital_id,
            request_date,
            updated_at: now,
            ..existing.clone()
        })
    }
}
