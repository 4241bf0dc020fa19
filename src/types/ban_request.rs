use serde::{Deserialize, Serialize};

use crate::types::AccountId;

/// A ban or timeout, as sent to `POST /helix/moderation/bans`.
///
/// A ban has no duration; a timeout carries one in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRequest {
    /// The account being acted on.
    pub user_id: AccountId,

    /// Timeout length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    /// Free-text reason shown to moderators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BanRequest {
    /// Create a permanent ban.
    pub fn ban(user_id: AccountId) -> Self {
        Self {
            user_id,
            duration: None,
            reason: None,
        }
    }

    /// Create a timeout lasting `duration` seconds.
    pub fn timeout(user_id: AccountId, duration: u32) -> Self {
        Self {
            user_id,
            duration: Some(duration),
            reason: None,
        }
    }

    /// Set the reason. An empty reason is left out of the request.
    pub fn with_reason(mut self, reason: &str) -> Self {
        let reason = reason.trim();
        self.reason = if reason.is_empty() {
            None
        } else {
            Some(reason.to_string())
        };
        self
    }

    /// Returns true if this request is a timeout rather than a ban.
    pub fn is_timeout(&self) -> bool {
        self.duration.is_some()
    }
}

/// The `{"data": ...}` envelope Helix expects around a [`BanRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRequestBody {
    /// The request itself.
    pub data: BanRequest,
}

impl From<BanRequest> for BanRequestBody {
    fn from(data: BanRequest) -> Self {
        Self { data }
    }
}
