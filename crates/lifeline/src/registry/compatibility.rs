//! Pure compatibility rules between a donor's attributes and a recipient's requirement.

use serde::{Deserialize, Serialize};

use super::domain::{BloodType, Organ};

/// How blood requirements are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodMatchMode {
    /// Standard ABO/Rh red cell compatibility.
    #[default]
    Compatible,
    /// Legacy behaviour: the donor's type must equal the needed type.
    Exact,
}

impl BloodMatchMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compatible" | "abo" => Some(Self::Compatible),
            "exact" | "legacy" => Some(Self::Exact),
            _ => None,
        }
    }

    pub fn permits(self, donor: BloodType, needed: BloodType) -> bool {
        match self {
            BloodMatchMode::Compatible => blood_compatible(donor, needed),
            BloodMatchMode::Exact => donor == needed,
        }
    }
}

/// Whether red cells of `donor` type may be given to a recipient of `needed` type.
///
/// The donor must not carry an antigen the recipient lacks, and an Rh-negative
/// recipient may only receive Rh-negative blood.
pub fn blood_compatible(donor: BloodType, needed: BloodType) -> bool {
    if donor.has_a_antigen() && !needed.has_a_antigen() {
        return false;
    }
    if donor.has_b_antigen() && !needed.has_b_antigen() {
        return false;
    }
    !donor.is_rh_positive() || needed.is_rh_positive()
}

/// Case-insensitive organ comparison.
///
/// Two enumerated organs must be identical. When either side is free text the
/// shorter identifier may appear anywhere within the longer one.
pub fn organ_compatible(donor: &Organ, needed: &Organ) -> bool {
    if donor.is_enumerated() && needed.is_enumerated() {
        return donor == needed;
    }

    let donor_label = donor.label().trim().to_lowercase();
    let needed_label = needed.label().trim().to_lowercase();
    if donor_label.is_empty() || needed_label.is_empty() {
        return false;
    }

    donor_label.contains(&needed_label) || needed_label.contains(&donor_label)
}
