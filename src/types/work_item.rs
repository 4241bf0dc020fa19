/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// A chat message to send.
    Message(String),
    /// An account to ban or time out.
    Target(ModerationTarget),
}

/// An account to act on, with an optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationTarget {
    /// Lowercased login.
    pub login: String,

    /// Reason for the action; empty when none was given.
    pub reason: String,
}

impl ModerationTarget {
    /// Creates a target, lowercasing the login and trimming both fields.
    pub fn new(login: &str, reason: &str) -> Self {
        Self {
            login: login.trim().to_lowercase(),
            reason: reason.trim().to_string(),
        }
    }

    /// Returns the reason, or `None` when empty.
    pub fn reason(&self) -> Option<&str> {
        if self.reason.is_empty() {
            None
        } else {
            Some(&self.reason)
        }
    }
}
