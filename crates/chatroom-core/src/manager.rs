//! Chat room management
//!
//! Composes the session registry and the message buffer table, and renders
//! the user-facing status / statistics / ranking reports.

use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::buffer::{BufferTable, FlushPayload};
use crate::session::{RoomKey, SessionRegistry, SweepEvent, UserStats, UserStatus};
use crate::transport::ChatTransport;

/// Display name used when nickname lookup fails
pub const UNKNOWN_USER: &str = "未知用户";
/// Number of users shown in the room ranking
pub const RANKING_LIMIT: usize = 5;

/// Chat-room state for all groups, owned by one manager instance
pub struct ChatRoomManager {
    registry: Mutex<SessionRegistry>,
    buffers: BufferTable,
}

impl ChatRoomManager {
    /// Create the manager together with the flush channel receiver
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FlushPayload>) {
        let (buffers, flush_rx) = BufferTable::new();
        (
            Self {
                registry: Mutex::new(SessionRegistry::new()),
                buffers,
            },
            flush_rx,
        )
    }

    /// Add the user to the group's chat room
    pub fn join(&self, key: &RoomKey) {
        self.registry.lock().unwrap().add(key);
    }

    /// Remove the user's session and their buffered messages
    pub fn leave(&self, key: &RoomKey) -> bool {
        let removed = self.registry.lock().unwrap().remove(key);
        self.buffers.remove(key);
        removed
    }

    /// Record activity for a user with a live session
    pub fn touch(&self, key: &RoomKey) {
        self.registry.lock().unwrap().touch(key);
    }

    /// Count message characters toward the user's stats
    pub fn record_chars(&self, key: &RoomKey, chars: u64) {
        self.registry.lock().unwrap().record_chars(key, chars);
    }

    pub fn set_status(&self, key: &RoomKey, status: UserStatus) {
        self.registry.lock().unwrap().set_status(key, status);
    }

    pub fn status(&self, key: &RoomKey) -> UserStatus {
        self.registry.lock().unwrap().status(key)
    }

    /// Whether the user has a live session. A timed-out session is removed
    /// here, along with its buffered messages; querying a user who simply
    /// has no session leaves their pending buffer untouched.
    pub fn is_active(&self, key: &RoomKey) -> bool {
        let mut registry = self.registry.lock().unwrap();
        if registry.expire_timed_out(key) {
            self.buffers.remove(key);
            return false;
        }
        registry.is_active(key)
    }

    /// Run the idle sweep, dropping buffers of timed-out users. The caller
    /// notifies the affected users from the returned events.
    pub fn sweep(&self) -> Vec<(RoomKey, SweepEvent)> {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> Vec<(RoomKey, SweepEvent)> {
        let events = self.registry.lock().unwrap().sweep_at(now);
        for (key, event) in &events {
            if *event == SweepEvent::Timeout {
                self.buffers.remove(key);
            }
        }
        if !events.is_empty() {
            debug!(count = events.len(), "idle sweep produced events");
        }
        events
    }

    /// Buffer a message fragment; the debounce timer is (re)started, or the
    /// buffer flushes immediately when full.
    pub fn buffer_message(&self, key: &RoomKey, text: impl Into<String>, files: Vec<String>) {
        self.buffers.append(key, text, files);
    }

    /// Drain a user's buffer without waiting for the timer
    pub fn drain_buffer(&self, key: &RoomKey) -> (String, Vec<String>) {
        self.buffers.drain(key)
    }

    pub fn stats(&self, key: &RoomKey) -> UserStats {
        self.registry.lock().unwrap().stats(key)
    }

    pub fn session_count(&self) -> usize {
        self.registry.lock().unwrap().session_count()
    }

    /// Per-user statistics report
    pub fn format_user_stats(&self, key: &RoomKey, nickname: &str) -> String {
        let mut registry = self.registry.lock().unwrap();
        let stats = registry.stats(key);
        let status = registry.status(key);
        let active_minutes = stats.total_active_time.as_secs() / 60;
        format!(
            "📊 {} 的聊天室数据：\n\n\
             🏷️ 当前状态：{}\n\
             💬 发送消息：{} 条\n\
             📝 总字数：{} 字\n\
             🔄 加入次数：{} 次\n\
             ⏱️ 活跃时间：{} 分钟",
            nickname, status, stats.total_messages, stats.total_chars, stats.join_count,
            active_minutes
        )
    }

    /// Room occupancy report
    pub fn format_room_status(&self, group_id: &str) -> String {
        let (active, away, total) = self.registry.lock().unwrap().occupancy(group_id);
        format!(
            "🏠 聊天室状态：\n\n\
             👥 当前成员：{} 人\n\
             ✨ 活跃成员：{} 人\n\
             💤 暂离成员：{} 人",
            total, active, away
        )
    }

    /// Top-N ranking by message count. Nickname lookup failures degrade to
    /// a placeholder instead of failing the report.
    pub async fn format_room_ranking(
        &self,
        group_id: &str,
        transport: &dyn ChatTransport,
        limit: usize,
    ) -> String {
        let ranked = self.registry.lock().unwrap().room_stats(group_id);
        let mut lines = vec!["🏆 聊天室排行榜：\n".to_string()];
        for (rank, (user_id, stats)) in ranked.into_iter().take(limit).enumerate() {
            let nickname = match transport.get_nickname(&user_id).await {
                Ok(Some(name)) if !name.is_empty() => name,
                _ => UNKNOWN_USER.to_string(),
            };
            lines.push(format!("{} {}", rank_emoji(rank + 1), nickname));
            lines.push(format!("   💬 {}条消息", stats.total_messages));
            lines.push(format!("   📝 {}字", stats.total_chars));
        }
        lines.join("\n")
    }
}

fn rank_emoji(rank: usize) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("{}.", n),
    }
}
