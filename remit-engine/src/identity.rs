use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use remit_core::{OperatorId, UserId};

/// Staff role authorized to process withdrawal requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    /// Full administrator: decisions plus platform-wide aggregates.
    Full,
    /// Limited administrator: decisions and listings only.
    Limited,
}

/// What the identity collaborator knows about a user, as far as the
/// withdrawal core cares.
#[derive(Clone, Debug)]
pub struct AccessProfile {
    pub suspended: bool,
    pub withdrawal_permitted: bool,
}

impl AccessProfile {
    /// An active, fully verified user.
    pub fn active() -> Self {
        Self {
            suspended: false,
            withdrawal_permitted: true,
        }
    }

    pub fn suspended() -> Self {
        Self {
            suspended: true,
            withdrawal_permitted: true,
        }
    }

    /// Verified identity still pending withdrawal permission (e.g. KYC).
    pub fn unverified() -> Self {
        Self {
            suspended: false,
            withdrawal_permitted: false,
        }
    }
}

/// Read-side of the platform's identity and role management.
///
/// `profile` returns `None` for unknown users; the service maps that to an
/// authorization failure rather than guessing.
pub trait IdentityProvider: Send + Sync {
    fn profile(&self, user: &UserId) -> Option<AccessProfile>;
    fn operator_role(&self, operator: &OperatorId) -> Option<OperatorRole>;
}

/// Fixed in-memory directory, for tests and embedded deployments.
#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<UserId, AccessProfile>,
    operators: HashMap<OperatorId, OperatorRole>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserId, profile: AccessProfile) -> Self {
        self.users.insert(user, profile);
        self
    }

    pub fn with_operator(mut self, operator: OperatorId, role: OperatorRole) -> Self {
        self.operators.insert(operator, role);
        self
    }
}

impl IdentityProvider for StaticDirectory {
    fn profile(&self, user: &UserId) -> Option<AccessProfile> {
        self.users.get(user).cloned()
    }

    fn operator_role(&self, operator: &OperatorId) -> Option<OperatorRole> {
        self.operators.get(operator).copied()
    }
}
