use serde::{Deserialize, Serialize};

use crate::types::AccountId;

/// One account from the Helix users endpoint.
///
/// Only the fields the tool reads are modeled; the rest are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The account's id.
    pub id: AccountId,

    /// The account's login name.
    pub login: String,

    /// The account's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Response envelope of `GET /helix/users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// Matching accounts; empty when the login does not exist.
    #[serde(default)]
    pub data: Vec<User>,
}

impl UserList {
    /// Returns the id of the first match, if any.
    pub fn first_id(&self) -> Option<&AccountId> {
        self.data.first().map(|user| &user.id)
    }
}
