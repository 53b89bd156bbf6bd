//! Chat-room session registry
//!
//! Tracks which users are currently "in" the chat room of each group and
//! enforces the idle/away/timeout policy. Per-user counters have their own
//! lifecycle: they are created lazily and survive leave/rejoin.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::session::{RoomKey, Session, UserStats, UserStatus};

/// Idle time after which a session is removed entirely
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(3600);
/// Idle time after which an Active session is marked Away
pub const AWAY_TIMEOUT: Duration = Duration::from_secs(1800);

/// What happened to a session during a sweep pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepEvent {
    /// Transitioned Active -> Away
    Away,
    /// Removed after exceeding the full timeout
    Timeout,
}

/// In-memory session table plus the per-user stats table
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<RoomKey, Session>,
    stats: HashMap<RoomKey, UserStats>,
    // Lazily-created stats entries in first-seen order; ranking ties are
    // resolved by this order.
    stats_order: Vec<RoomKey>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stats_entry(&mut self, key: &RoomKey, now: Instant) -> &mut UserStats {
        if !self.stats.contains_key(key) {
            self.stats.insert(key.clone(), UserStats::new(now));
            self.stats_order.push(key.clone());
        }
        self.stats.get_mut(key).unwrap()
    }

    /// Add (or re-add) a user to the chat room. Re-adding resets timestamps
    /// and still increments the join counter: rejoin churn is tracked.
    pub fn add(&mut self, key: &RoomKey) {
        self.add_at(key, Instant::now());
    }

    pub fn add_at(&mut self, key: &RoomKey, now: Instant) {
        self.sessions.insert(key.clone(), Session::new(now));
        let stats = self.stats_entry(key, now);
        stats.join_count += 1;
        stats.last_active = now;
        stats.status = UserStatus::Active;
        debug!(group = %key.group_id, user = %key.user_id, "user joined chat room");
    }

    /// Remove a user's session, folding the elapsed active time into their
    /// stats. No-op if absent.
    pub fn remove(&mut self, key: &RoomKey) -> bool {
        self.remove_at(key, Instant::now())
    }

    pub fn remove_at(&mut self, key: &RoomKey, now: Instant) -> bool {
        if self.sessions.remove(key).is_none() {
            return false;
        }
        let stats = self.stats_entry(key, now);
        stats.total_active_time += now.saturating_duration_since(stats.last_active);
        stats.status = UserStatus::Inactive;
        debug!(group = %key.group_id, user = %key.user_id, "user left chat room");
        true
    }

    /// Record activity: refresh the idle clock and count the message.
    /// No-op for users without a live session.
    pub fn touch(&mut self, key: &RoomKey) {
        self.touch_at(key, Instant::now());
    }

    pub fn touch_at(&mut self, key: &RoomKey, now: Instant) {
        if let Some(session) = self.sessions.get_mut(key) {
            session.last_active = now;
            let stats = self.stats_entry(key, now);
            stats.total_messages += 1;
            stats.last_active = now;
        }
    }

    /// Add to a user's character count. Counters are lazily created, so this
    /// works even without a live session.
    pub fn record_chars(&mut self, key: &RoomKey, chars: u64) {
        let now = Instant::now();
        self.stats_entry(key, now).total_chars += chars;
    }

    /// Set the status on both the session and the stats entry, if present
    pub fn set_status(&mut self, key: &RoomKey, status: UserStatus) {
        if let Some(session) = self.sessions.get_mut(key) {
            session.status = status;
            if let Some(stats) = self.stats.get_mut(key) {
                stats.status = status;
            }
        }
    }

    /// Current status; Inactive for absent sessions
    pub fn status(&self, key: &RoomKey) -> UserStatus {
        self.sessions
            .get(key)
            .map(|s| s.status)
            .unwrap_or(UserStatus::Inactive)
    }

    /// Whether the user has a live, non-timed-out session. A session past
    /// the full timeout is removed here as a side effect.
    pub fn is_active(&mut self, key: &RoomKey) -> bool {
        self.is_active_at(key, Instant::now())
    }

    pub fn is_active_at(&mut self, key: &RoomKey, now: Instant) -> bool {
        !self.expire_timed_out_at(key, now) && self.sessions.contains_key(key)
    }

    /// Remove the session if it idled past the full timeout. Reports whether
    /// a removal happened, so callers can drop dependent state for exactly
    /// the timed-out case and not for merely-absent sessions.
    pub fn expire_timed_out(&mut self, key: &RoomKey) -> bool {
        self.expire_timed_out_at(key, Instant::now())
    }

    pub fn expire_timed_out_at(&mut self, key: &RoomKey, now: Instant) -> bool {
        let Some(session) = self.sessions.get(key) else {
            return false;
        };
        if now.saturating_duration_since(session.last_active) > CHAT_TIMEOUT {
            self.remove_at(key, now);
            true
        } else {
            false
        }
    }

    /// One pass over all sessions. Timeout dominates: a session past both
    /// thresholds is removed and reported as Timeout, never as Away. Away is
    /// reported only for Active sessions in the band between the two
    /// thresholds, so repeated sweeps in that band report it once.
    pub fn sweep(&mut self) -> Vec<(RoomKey, SweepEvent)> {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&mut self, now: Instant) -> Vec<(RoomKey, SweepEvent)> {
        let keys: Vec<RoomKey> = self.sessions.keys().cloned().collect();
        let mut events = Vec::new();
        for key in keys {
            let Some(session) = self.sessions.get(&key) else {
                continue;
            };
            let status = session.status;
            let idle = now.saturating_duration_since(session.last_active);
            if idle > CHAT_TIMEOUT {
                self.remove_at(&key, now);
                events.push((key, SweepEvent::Timeout));
            } else if status == UserStatus::Active && idle > AWAY_TIMEOUT {
                self.set_status(&key, UserStatus::Away);
                events.push((key, SweepEvent::Away));
            }
        }
        events
    }

    /// A copy of the user's counters (lazily created if absent)
    pub fn stats(&mut self, key: &RoomKey) -> UserStats {
        self.stats_entry(key, Instant::now()).clone()
    }

    /// All users of a group with stats, sorted by message count descending.
    /// The sort is stable: ties keep first-seen order.
    pub fn room_stats(&self, group_id: &str) -> Vec<(String, UserStats)> {
        let mut entries: Vec<(String, UserStats)> = self
            .stats_order
            .iter()
            .filter(|key| key.group_id == group_id)
            .filter_map(|key| {
                self.stats
                    .get(key)
                    .map(|stats| (key.user_id.clone(), stats.clone()))
            })
            .collect();
        entries.sort_by(|a, b| b.1.total_messages.cmp(&a.1.total_messages));
        entries
    }

    /// (active, away, total) occupancy over live sessions of a group
    pub fn occupancy(&self, group_id: &str) -> (usize, usize, usize) {
        let mut active = 0;
        let mut away = 0;
        let mut total = 0;
        for (key, session) in &self.sessions {
            if key.group_id == group_id {
                total += 1;
                match session.status {
                    UserStatus::Active => active += 1,
                    UserStatus::Away => away += 1,
                    UserStatus::Inactive => {}
                }
            }
        }
        (active, away, total)
    }

    /// Number of live sessions across all groups
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RoomKey {
        RoomKey::new("group-1", "user-1")
    }

    #[test]
    fn test_add_touch_remove() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        assert_eq!(registry.status(&key()), UserStatus::Active);
        assert!(registry.is_active_at(&key(), now));

        registry.touch_at(&key(), now + Duration::from_secs(5));
        assert_eq!(registry.stats(&key()).total_messages, 1);

        assert!(registry.remove_at(&key(), now + Duration::from_secs(10)));
        assert_eq!(registry.status(&key()), UserStatus::Inactive);
        assert!(!registry.is_active_at(&key(), now + Duration::from_secs(10)));
        // second remove is a no-op
        assert!(!registry.remove_at(&key(), now + Duration::from_secs(10)));
    }

    #[test]
    fn test_rejoin_increments_join_count() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        registry.remove_at(&key(), now + Duration::from_secs(1));
        registry.add_at(&key(), now + Duration::from_secs(2));

        assert_eq!(registry.stats(&key()).join_count, 2);
    }

    #[test]
    fn test_active_time_accumulates_on_remove() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        registry.remove_at(&key(), now + Duration::from_secs(120));

        assert_eq!(
            registry.stats(&key()).total_active_time,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_is_active_times_out_with_implicit_remove() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        let later = now + CHAT_TIMEOUT + Duration::from_secs(1);
        assert!(!registry.is_active_at(&key(), later));
        // the timed-out entry was removed, not merely reported
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.stats(&key()).status, UserStatus::Inactive);
    }

    #[test]
    fn test_expire_only_removes_timed_out_sessions() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        // nothing to expire for an absent session
        assert!(!registry.expire_timed_out_at(&key(), now));

        registry.add_at(&key(), now);
        assert!(!registry.expire_timed_out_at(&key(), now + CHAT_TIMEOUT));
        assert!(registry.expire_timed_out_at(&key(), now + CHAT_TIMEOUT + Duration::from_secs(1)));
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_sweep_away_band_is_idempotent() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        let at = now + AWAY_TIMEOUT + Duration::from_secs(1);

        let events = registry.sweep_at(at);
        assert_eq!(events, vec![(key(), SweepEvent::Away)]);
        assert_eq!(registry.status(&key()), UserStatus::Away);

        // idle time still in the away band: nothing further to report
        let events = registry.sweep_at(at + Duration::from_secs(10));
        assert!(events.is_empty());
    }

    #[test]
    fn test_sweep_timeout_dominates_away() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        // idle 4000s: past both thresholds, reported as timeout only
        let events = registry.sweep_at(now + Duration::from_secs(4000));
        assert_eq!(events, vec![(key(), SweepEvent::Timeout)]);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_sweep_removes_away_session_past_timeout() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        registry.sweep_at(now + AWAY_TIMEOUT + Duration::from_secs(1));
        assert_eq!(registry.status(&key()), UserStatus::Away);

        let events = registry.sweep_at(now + CHAT_TIMEOUT + Duration::from_secs(1));
        assert_eq!(events, vec![(key(), SweepEvent::Timeout)]);
        assert_eq!(registry.status(&key()), UserStatus::Inactive);
    }

    #[test]
    fn test_touch_resets_idle_clock() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&key(), now);
        let touched = now + Duration::from_secs(3000);
        registry.touch_at(&key(), touched);

        // 3500s after add but only 500s after touch: still active
        assert!(registry.is_active_at(&key(), now + Duration::from_secs(3500)));
    }

    #[test]
    fn test_ranking_stable_ties() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        for (user, messages) in [("u1", 5), ("u2", 5), ("u3", 2)] {
            let key = RoomKey::new("group-1", user);
            registry.add_at(&key, now);
            for i in 0..messages {
                registry.touch_at(&key, now + Duration::from_secs(i));
            }
        }

        let ranked: Vec<_> = registry
            .room_stats("group-1")
            .into_iter()
            .map(|(user, stats)| (user, stats.total_messages))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("u1".to_string(), 5),
                ("u2".to_string(), 5),
                ("u3".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_occupancy_counts() {
        let mut registry = SessionRegistry::new();
        let now = Instant::now();

        registry.add_at(&RoomKey::new("group-1", "u1"), now);
        registry.add_at(&RoomKey::new("group-1", "u2"), now);
        registry.add_at(&RoomKey::new("group-2", "u3"), now);
        registry.set_status(&RoomKey::new("group-1", "u2"), UserStatus::Away);

        assert_eq!(registry.occupancy("group-1"), (1, 1, 2));
        assert_eq!(registry.occupancy("group-2"), (1, 0, 1));
    }
}
