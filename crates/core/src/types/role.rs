//! User roles.

use serde::{Deserialize, Serialize};

/// The role attached to a profile row.
///
/// Used only for conditional UI (e.g., showing an "admin" link); actual
/// authorization is enforced server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// True for the admin role.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}
