// Public modules
pub mod account_id;
pub mod ban_request;
pub mod channel_context;
pub mod user;
pub mod work_item;

// Re-exports
pub use account_id::AccountId;
pub use ban_request::{BanRequest, BanRequestBody};
pub use channel_context::ChannelContext;
pub use user::{User, UserList};
pub use work_item::{ModerationTarget, WorkItem};
