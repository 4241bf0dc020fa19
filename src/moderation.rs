//! Ban and timeout actions.
//!
//! [`ModerationClient`] turns a login into an id with an [`IdentityResolver`]
//! and then files the action through a [`ModerationApi`], scoped to the
//! channel the session joined.

use crate::error::{Error, Result};
use crate::types::{AccountId, BanRequest, ChannelContext};

/// Maps a login to the account's id.
///
/// Lookup failures of any kind are `None`; implementations log the cause.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns the id of the account with this login, if it can be found.
    async fn resolve(&self, login: &str) -> Option<AccountId>;
}

/// The endpoint that files bans and timeouts.
#[async_trait::async_trait]
pub trait ModerationApi: Send + Sync {
    /// File a single ban or timeout in `channel`.
    async fn create_ban(&self, channel: &ChannelContext, request: BanRequest) -> Result<()>;
}

/// Files bans and timeouts for one channel.
pub struct ModerationClient<'a, H: IdentityResolver + ModerationApi> {
    helix: &'a H,
    channel: &'a ChannelContext,
}

impl<'a, H: IdentityResolver + ModerationApi> ModerationClient<'a, H> {
    /// Creates a client acting in `channel`.
    pub fn new(helix: &'a H, channel: &'a ChannelContext) -> Self {
        Self { helix, channel }
    }

    /// The channel actions are filed in.
    pub fn channel(&self) -> &ChannelContext {
        self.channel
    }

    /// Permanently ban `login`.
    pub async fn ban(&self, login: &str, reason: Option<&str>) -> Result<()> {
        let user_id = self.target_id(login).await?;
        let request = BanRequest::ban(user_id).with_reason(reason.unwrap_or_default());
        self.helix.create_ban(self.channel, request).await
    }

    /// Time out `login` for `duration` seconds.
    pub async fn timeout_user(
        &self,
        login: &str,
        duration: u32,
        reason: Option<&str>,
    ) -> Result<()> {
        let user_id = self.target_id(login).await?;
        let request =
            BanRequest::timeout(user_id, duration).with_reason(reason.unwrap_or_default());
        self.helix.create_ban(self.channel, request).await
    }

    async fn target_id(&self, login: &str) -> Result<AccountId> {
        self.helix.resolve(login).await.ok_or_else(|| {
            Error::not_found("could not resolve target account", Some(login.to_string()))
        })
    }
}
