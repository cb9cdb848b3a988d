//! Chat-side collaborators.
//!
//! Three seams: delivering a message ([`NotifyChannel`]), finding chat users
//! by email ([`UserDirectory`]) and managing channel membership
//! ([`ChannelMembership`]). Mattermost implements all of them.

pub mod mattermost;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ChannelError;
use crate::message::OnCallMessage;

pub use mattermost::{MattermostChannel, MattermostClient};

/// A chat user as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
}

/// Trait for notification channels.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Deliver one on-call message.
    async fn send(&self, message: &OnCallMessage) -> Result<(), ChannelError>;
}

/// Finds chat users for on-call identifiers.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_email(&self, email: &str) -> Result<ChatUser, ChannelError>;
}

/// Adds users to the channel behind a webhook.
#[async_trait]
pub trait ChannelMembership: Send + Sync {
    /// Channel id an incoming webhook posts into.
    async fn channel_for_webhook(&self, webhook_url: &str) -> Result<String, ChannelError>;

    async fn add_member(&self, channel_id: &str, user_id: &str) -> Result<(), ChannelError>;
}
