use crate::types::AccountId;

/// The channel a session joined, with the ids moderation calls are scoped by.
///
/// Resolved once while connecting and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelContext {
    /// Channel login, without the leading `#`.
    pub channel: String,

    /// Id of the channel's broadcaster.
    pub channel_id: AccountId,

    /// Id of the account the tool acts as.
    pub self_id: AccountId,
}

impl ChannelContext {
    /// Creates a channel context. The channel name is normalized to the
    /// lowercase login without `#`.
    pub fn new(channel: &str, channel_id: AccountId, self_id: AccountId) -> Self {
        Self {
            channel: normalize_channel(channel),
            channel_id,
            self_id,
        }
    }
}

/// Lowercases a channel name and strips whitespace and any leading `#`.
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_normalized() {
        let ctx = ChannelContext::new(" #SomeChannel ", AccountId::new("1"), AccountId::new("2"));
        assert_eq!(ctx.channel, "somechannel");
    }
}
