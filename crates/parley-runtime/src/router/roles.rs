use std::collections::HashSet;

use parley_core::Role;

use crate::config::BotConfig;

/// Maps user ids to the roles granted in configuration.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    admins: HashSet<String>,
    moderators: HashSet<String>,
}

impl RoleTable {
    /// Creates a table from explicit id lists.
    pub fn new<A, M>(admins: A, moderators: M) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
            moderators: moderators.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a table from `bot.admins` and `bot.moderators`.
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.admins.iter().cloned(), config.moderators.iter().cloned())
    }

    /// Returns the highest role `user_id` holds.
    pub fn resolve(&self, user_id: &str) -> Role {
        if self.admins.contains(user_id) {
            Role::Admin
        } else if self.moderators.contains(user_id) {
            Role::Moderator
        } else {
            Role::Everyone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_highest_role() {
        let roles = RoleTable::new(["1", "3"], ["2", "3"]);

        assert_eq!(roles.resolve("1"), Role::Admin);
        assert_eq!(roles.resolve("2"), Role::Moderator);
        assert_eq!(roles.resolve("3"), Role::Admin);
        assert_eq!(roles.resolve("4"), Role::Everyone);
    }
}
