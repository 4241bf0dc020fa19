//! Bulk chat messaging and moderation for Twitch channels.
//!
//! The crate joins a channel over the IRC-style chat protocol and then works
//! through a list of messages to send or accounts to ban or time out, one at
//! a time with a fixed delay between actions.

// Public modules
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod moderation;
pub mod observability;
pub mod render;
pub mod session;
pub mod types;
pub mod workload;

// Re-exports
pub use batch::{BatchAction, BatchReport, BatchRunner, Confirm};
pub use client::Helix;
pub use config::{Args, ChatConfig, Credentials, Mode, StoredConfig};
pub use error::{Error, Result};
pub use moderation::{IdentityResolver, ModerationApi, ModerationClient};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use session::{ChatSession, ServerLine, SessionState, classify};
pub use types::*;
pub use workload::Workload;
