//! Chat transport contract
//!
//! The actual messaging client (the WeChat automation API in the original
//! deployment) lives outside this workspace; this is the surface the
//! gateway needs from it.

use async_trait::async_trait;

use crate::error::Result;

/// An inbound chat message as delivered by the transport
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Chat the message arrived in: the group id, or the peer for private chats
    pub from_id: String,
    /// The individual sender (equal to `from_id` in private chats)
    pub sender_id: String,
    pub content: String,
    pub is_group: bool,
    pub msg_type: i32,
}

impl ChatMessage {
    /// A group text message, for tests and the console front-end
    pub fn group_text(
        group_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from_id: group_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            is_group: true,
            msg_type: 1,
        }
    }

    /// A private text message
    pub fn private_text(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            from_id: sender_id.clone(),
            sender_id,
            content: content.into(),
            is_group: false,
            msg_type: 1,
        }
    }
}

/// Outbound side of the messaging client
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send plain text to a chat
    async fn send_text(&self, target_id: &str, text: &str) -> Result<()>;

    /// Send text to a group, @-mentioning the given users
    async fn send_at(&self, target_id: &str, text: &str, mentioned: &[String]) -> Result<()>;

    /// Resolve a user's display name. `Ok(None)` means the transport has no
    /// name for the user; callers degrade to a placeholder either way.
    async fn get_nickname(&self, user_id: &str) -> Result<Option<String>>;
}
