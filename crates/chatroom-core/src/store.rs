//! Persistent bot store contract
//!
//! Points, whitelist membership and backend conversation ids are persisted
//! by the host bot (a SQLite database in the original deployment). Only the
//! call surface is modeled here.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait BotStore: Send + Sync {
    /// Current point balance of a user
    async fn points(&self, user_id: &str) -> Result<i64>;

    /// Adjust a user's point balance by `delta` (negative to deduct)
    async fn add_points(&self, user_id: &str, delta: i64) -> Result<()>;

    /// Whether the user is whitelisted
    async fn in_whitelist(&self, user_id: &str) -> Result<bool>;

    /// The stored backend conversation id for a chat; empty if none
    async fn thread_id(&self, chat_id: &str) -> Result<String>;

    /// Persist the backend conversation id for a chat
    async fn save_thread_id(&self, chat_id: &str, thread_id: &str) -> Result<()>;
}
