//! Command permission roles.
//!
//! Roles are ordered by their numeric value: a user holding a higher role
//! may run every command a lower role may run.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Permission level required to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anyone.
    #[default]
    Everyone,
    /// Bot moderators.
    Moderator,
    /// Bot administrators.
    Admin,
}

impl Role {
    /// All roles, lowest first.
    pub const ALL: [Role; 3] = [Role::Everyone, Role::Moderator, Role::Admin];

    /// Returns the numeric value of the role.
    pub const fn value(self) -> f32 {
        match self {
            Self::Everyone => 0.0,
            Self::Moderator => 1.5,
            Self::Admin => 2.0,
        }
    }

    /// Returns the uppercase role name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Everyone => "EVERYONE",
            Self::Moderator => "MODERATOR",
            Self::Admin => "ADMIN",
        }
    }

    /// Looks up a role by its exact numeric value.
    pub fn from_value(value: f32) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.value() == value)
    }

    /// Returns `true` if a user holding `self` may run something requiring `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }

    fn rank(self) -> u8 {
        match self {
            Self::Everyone => 0,
            Self::Moderator => 1,
            Self::Admin => 2,
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value(), self.name())
    }
}
