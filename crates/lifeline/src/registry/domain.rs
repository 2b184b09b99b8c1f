use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier for donor profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DonorId(pub u64);

/// Store-assigned identifier for recipient requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

/// Identifier of an account managed by the external authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DonorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "donor-{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ABO/Rh blood groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
        BloodType::OPositive,
        BloodType::ONegative,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }

    /// Whether the red cells carry the A antigen.
    pub const fn has_a_antigen(self) -> bool {
        matches!(
            self,
            BloodType::APositive
                | BloodType::ANegative
                | BloodType::AbPositive
                | BloodType::AbNegative
        )
    }

    /// Whether the red cells carry the B antigen.
    pub const fn has_b_antigen(self) -> bool {
        matches!(
            self,
            BloodType::BPositive
                | BloodType::BNegative
                | BloodType::AbPositive
                | BloodType::AbNegative
        )
    }

    pub const fn is_rh_positive(self) -> bool {
        matches!(
            self,
            BloodType::APositive
                | BloodType::BPositive
                | BloodType::AbPositive
                | BloodType::OPositive
        )
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised blood type '{0}'")]
pub struct ParseBloodTypeError(pub String);

impl FromStr for BloodType {
    type Err = ParseBloodTypeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        BloodType::ALL
            .into_iter()
            .find(|candidate| candidate.label() == normalized)
            .ok_or_else(|| ParseBloodTypeError(raw.to_string()))
    }
}

/// Organ or tissue offered or needed. Unknown entries are kept verbatim as free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Organ {
    Kidney,
    Liver,
    Heart,
    Lung,
    Pancreas,
    Intestine,
    Cornea,
    BoneMarrow,
    Other(String),
}

impl Organ {
    const KNOWN: [Organ; 8] = [
        Organ::Kidney,
        Organ::Liver,
        Organ::Heart,
        Organ::Lung,
        Organ::Pancreas,
        Organ::Intestine,
        Organ::Cornea,
        Organ::BoneMarrow,
    ];

    /// Parse an organ identifier, falling back to free text for anything unrecognised.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let key = trimmed.to_ascii_lowercase().replace(['-', '_'], " ");
        Self::KNOWN
            .into_iter()
            .find(|known| known.label().eq_ignore_ascii_case(&key))
            .unwrap_or_else(|| Organ::Other(trimmed.to_string()))
    }

    pub fn label(&self) -> &str {
        match self {
            Organ::Kidney => "kidney",
            Organ::Liver => "liver",
            Organ::Heart => "heart",
            Organ::Lung => "lung",
            Organ::Pancreas => "pancreas",
            Organ::Intestine => "intestine",
            Organ::Cornea => "cornea",
            Organ::BoneMarrow => "bone marrow",
            Organ::Other(text) => text,
        }
    }

    /// True when the value was drawn from the fixed enumeration.
    pub fn is_enumerated(&self) -> bool {
        !matches!(self, Organ::Other(_))
    }
}

impl From<String> for Organ {
    fn from(value: String) -> Self {
        Organ::parse(&value)
    }
}

impl From<Organ> for String {
    fn from(value: Organ) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Organ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Review state of a donor profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

/// Lifecycle state of a recipient request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Fulfilled => "FULFILLED",
        }
    }
}

/// Recipient supplied priority, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for UrgencyLevel {
    fn default() -> Self {
        UrgencyLevel::Medium
    }
}

/// The two record kinds governed by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    DonorProfile,
    RecipientRequest,
}

impl RecordKind {
    pub const fn label(self) -> &'static str {
        match self {
            RecordKind::DonorProfile => "donor_profile",
            RecordKind::RecipientRequest => "recipient_request",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed reference to either record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
    Donor(DonorId),
    Request(RequestId),
}

impl RecordRef {
    pub const fn kind(self) -> RecordKind {
        match self {
            RecordRef::Donor(_) => RecordKind::DonorProfile,
            RecordRef::Request(_) => RecordKind::RecipientRequest,
        }
    }

    pub const fn raw_id(self) -> u64 {
        match self {
            RecordRef::Donor(id) => id.0,
            RecordRef::Request(id) => id.0,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Donor(id) => id.fmt(f),
            RecordRef::Request(id) => id.fmt(f),
        }
    }
}

/// Owner supplied donor form, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorSubmission {
    #[serde(default)]
    pub blood_type: Option<BloodType>,
    #[serde(default)]
    pub organ: Option<String>,
    pub location: String,
    pub contact_info: String,
    #[serde(default = "default_availability")]
    pub availability: bool,
    #[serde(default)]
    pub last_donation_date: Option<NaiveDate>,
}

fn default_availability() -> bool {
    true
}

/// Validated donor profile awaiting an id from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonorProfile {
    pub owner_user_id: UserId,
    pub blood_type: Option<BloodType>,
    pub organ: Option<Organ>,
    pub location: String,
    pub contact_info: String,
    pub availability: bool,
    pub last_donation_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A person's willingness and eligibility to donate blood or an organ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorProfile {
    pub id: DonorId,
    pub owner_user_id: UserId,
    pub blood_type: Option<BloodType>,
    pub organ: Option<Organ>,
    pub location: String,
    pub contact_info: String,
    pub availability: bool,
    pub approval_status: ApprovalStatus,
    pub last_donation_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DonorProfile {
    pub fn from_new(id: DonorId, draft: NewDonorProfile) -> Self {
        Self {
            id,
            owner_user_id: draft.owner_user_id,
            blood_type: draft.blood_type,
            organ: draft.organ,
            location: draft.location,
            contact_info: draft.contact_info,
            availability: draft.availability,
            approval_status: ApprovalStatus::Pending,
            last_donation_date: draft.last_donation_date,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        }
    }
}

/// Owner supplied recipient form, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSubmission {
    #[serde(default)]
    pub blood_type_needed: Option<BloodType>,
    #[serde(default)]
    pub organ_needed: Option<String>,
    pub location: String,
    pub contact_info: String,
    #[serde(default)]
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub medical_condition: String,
    #[serde(default)]
    pub hospital_id: Option<String>,
    #[serde(default)]
    pub request_date: Option<NaiveDate>,
}

/// Validated recipient request awaiting an id from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipientRequest {
    pub owner_user_id: UserId,
    pub blood_type_needed: Option<BloodType>,
    pub organ_needed: Option<Organ>,
    pub location: String,
    pub contact_info: String,
    pub urgency_level: UrgencyLevel,
    pub medical_condition: String,
    pub hospital_id: Option<String>,
    pub request_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A person's need for blood or an organ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRequest {
    pub id: RequestId,
    pub owner_user_id: UserId,
    pub blood_type_needed: Option<BloodType>,
    pub organ_needed: Option<Organ>,
    pub location: String,
    pub contact_info: String,
    pub urgency_level: UrgencyLevel,
    pub medical_condition: String,
    pub status: RequestStatus,
    pub hospital_id: Option<String>,
    pub resubmissions: u8,
    pub request_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecipientRequest {
    pub fn from_new(id: RequestId, draft: NewRecipientRequest) -> Self {
        Self {
            id,
            owner_user_id: draft.owner_user_id,
            blood_type_needed: draft.blood_type_needed,
            organ_needed: draft.organ_needed,
            location: draft.location,
            contact_info: draft.contact_info,
            urgency_level: draft.urgency_level,
            medical_condition: draft.medical_condition,
            status: RequestStatus::Pending,
            hospital_id: draft.hospital_id,
            resubmissions: 0,
            request_date: draft.request_date,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        }
    }

    /// True when at least one requirement field is present.
    pub fn has_requirement(&self) -> bool {
        self.blood_type_needed.is_some() || self.organ_needed.is_some()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(needle.trim().to_lowercase().as_str())
}

/// Predicate used by `ListByFilter` over donor profiles. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorFilter {
    #[serde(default)]
    pub blood_type: Option<BloodType>,
    #[serde(default)]
    pub organ: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl DonorFilter {
    /// Filter selecting the donors the matching engine may consider.
    pub fn eligible() -> Self {
        Self {
            approval_status: Some(ApprovalStatus::Approved),
            available: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, donor: &DonorProfile) -> bool {
        if let Some(blood_type) = self.blood_type {
            if donor.blood_type != Some(blood_type) {
                return false;
            }
        }

        if let Some(organ) = &self.organ {
            match &donor.organ {
                Some(donor_organ) if contains_ignore_case(donor_organ.label(), organ) => {}
                _ => return false,
            }
        }

        if let Some(location) = &self.location {
            if !contains_ignore_case(&donor.location, location) {
                return false;
            }
        }

        if let Some(status) = self.approval_status {
            if donor.approval_status != status {
                return false;
            }
        }

        if let Some(available) = self.available {
            if donor.availability != available {
                return false;
            }
        }

        true
    }
}

/// Predicate used by `ListByFilter` over recipient requests. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub blood_type_needed: Option<BloodType>,
    #[serde(default)]
    pub organ_needed: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub minimum_urgency: Option<UrgencyLevel>,
}

impl RequestFilter {
    pub fn matches(&self, request: &RecipientRequest) -> bool {
        if let Some(blood_type) = self.blood_type_needed {
            if request.blood_type_needed != Some(blood_type) {
                return false;
            }
        }

        if let Some(organ) = &self.organ_needed {
            match &request.organ_needed {
                Some(needed) if contains_ignore_case(needed.label(), organ) => {}
                _ => return false,
            }
        }

        if let Some(location) = &self.location {
            if !contains_ignore_case(&request.location, location) {
                return false;
            }
        }

        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }

        if let Some(minimum) = self.minimum_urgency {
            if request.urgency_level < minimum {
                return false;
            }
        }

        true
    }
}
