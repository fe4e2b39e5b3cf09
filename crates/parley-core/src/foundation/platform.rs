//! Platform identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The chat platform an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Facebook Messenger.
    Facebook,
    /// Discord.
    Discord,
    /// Not tied to a concrete platform (tests, synthetic adapters).
    Unspecified,
}

impl Platform {
    /// Returns the lowercase platform name used in configuration and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Discord => "discord",
            Self::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
