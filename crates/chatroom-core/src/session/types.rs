//! Session types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Composite key identifying a user within a group chat
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub group_id: String,
    pub user_id: String,
}

impl RoomKey {
    /// Create a new room key
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Chat-room membership status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Away,
    #[default]
    Inactive,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UserStatus::Active => "活跃",
            UserStatus::Away => "离开",
            UserStatus::Inactive => "未加入",
        };
        write!(f, "{}", label)
    }
}

/// Running per-user counters. Created lazily on first access and kept for
/// the process lifetime, across leave/rejoin.
#[derive(Debug, Clone)]
pub struct UserStats {
    pub total_messages: u64,
    pub total_chars: u64,
    pub join_count: u32,
    pub last_active: Instant,
    /// Accumulated only when the user leaves the Active state via removal
    pub total_active_time: Duration,
    pub status: UserStatus,
}

impl UserStats {
    pub fn new(now: Instant) -> Self {
        Self {
            total_messages: 0,
            total_chars: 0,
            join_count: 0,
            last_active: now,
            total_active_time: Duration::ZERO,
            status: UserStatus::Inactive,
        }
    }
}

/// A live chat-room session entry. Owned exclusively by the registry.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: UserStatus,
    pub last_active: Instant,
}

impl Session {
    pub fn new(now: Instant) -> Self {
        Self {
            status: UserStatus::Active,
            last_active: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(UserStatus::Active.to_string(), "活跃");
        assert_eq!(UserStatus::Away.to_string(), "离开");
        assert_eq!(UserStatus::Inactive.to_string(), "未加入");
    }

    #[test]
    fn test_room_key_equality() {
        let a = RoomKey::new("group-1", "user-1");
        let b = RoomKey::new("group-1", "user-1");
        assert_eq!(a, b);
        assert_ne!(a, RoomKey::new("group-1", "user-2"));
    }
}
