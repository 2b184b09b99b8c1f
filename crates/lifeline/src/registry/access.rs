use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::UserId;

/// Account roles known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Donor,
    Recipient,
    Hospital,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Donor => "DONOR",
            Role::Recipient => "RECIPIENT",
            Role::Hospital => "HOSPITAL",
            Role::Admin => "ADMIN",
        }
    }

    /// The single authorization check for role-gated actions.
    pub const fn permits(self, action: Action) -> bool {
        match action {
            Action::SubmitDonorProfile => matches!(self, Role::Donor | Role::Admin),
            Action::SubmitRecipientRequest => {
                matches!(self, Role::Recipient | Role::Hospital | Role::Admin)
            }
            Action::Review | Action::Administer => matches!(self, Role::Admin),
            Action::EditOwnRecord | Action::ViewRecord => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operations that require an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SubmitDonorProfile,
    SubmitRecipientRequest,
    EditOwnRecord,
    ViewRecord,
    Review,
    Administer,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Action::SubmitDonorProfile => "submit donor profiles",
            Action::SubmitRecipientRequest => "submit recipient requests",
            Action::EditOwnRecord => "edit this record",
            Action::ViewRecord => "view this record",
            Action::Review => "review records",
            Action::Administer => "administer records",
        }
    }
}

/// Decisions delegated to the external authentication collaborator.
pub trait AccessPolicy: Send + Sync {
    fn role_of(&self, actor: &UserId) -> Option<Role>;

    fn is_admin(&self, actor: &UserId) -> bool {
        self.role_of(actor) == Some(Role::Admin)
    }
}

/// True when `actor` is known and their role permits `action`.
pub fn authorize<P>(policy: &P, actor: &UserId, action: Action) -> bool
where
    P: AccessPolicy + ?Sized,
{
    policy
        .role_of(actor)
        .map(|role| role.permits(action))
        .unwrap_or(false)
}
