//! Session-related types.
//!
//! Types describing where the authenticated identity snapshot lives locally.

use serde::{Deserialize, Serialize};

/// Local persistence tier holding the canonical identity snapshot.
///
/// At most one tier holds a snapshot at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPersistenceTier {
    /// Survives restarts (the "remember me" choice).
    Remembered,
    /// Cleared when the process (tab) goes away.
    Ephemeral,
    /// No local snapshot.
    #[default]
    None,
}

impl SessionPersistenceTier {
    /// Tier selected by the "remember me" choice at login.
    #[must_use]
    pub const fn for_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self::Remembered
        } else {
            Self::Ephemeral
        }
    }
}

impl std::fmt::Display for SessionPersistenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remembered => write!(f, "remembered"),
            Self::Ephemeral => write!(f, "ephemeral"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Storage keys for session data.
pub mod keys {
    /// Key for the serialized identity snapshot.
    pub const USER: &str = "user";

    /// Flag key marking the remembered tier as canonical.
    pub const REMEMBER_ME: &str = "rememberMe";

    /// Value stored under [`REMEMBER_ME`] when the flag is set.
    pub const REMEMBER_ME_SET: &str = "true";

    /// Key for the locally cached cart (cleared on logout).
    pub const CART: &str = "cart";

    /// Key for the remote session credential of a remembered login.
    pub const REMOTE_SESSION: &str = "remoteSession";
}
