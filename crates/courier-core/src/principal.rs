//! Authenticated principal handle.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// An authenticated user as seen by the delivery core.
///
/// Two principals are equal when they carry the same [`UserId`], regardless
/// of how the username is spelled or which connection produced them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable identity.
    pub user_id: UserId,
    /// Display / login name.
    pub username: String,
}

impl Principal {
    /// Create a principal.
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }

    /// Case-insensitive username comparison.
    pub fn matches_username(&self, username: &str) -> bool {
        self.username.eq_ignore_ascii_case(username)
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
    }
}

impl Eq for Principal {}

impl Hash for Principal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
    }
}
