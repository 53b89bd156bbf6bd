//! Chat-room session management
//!
//! Per-(group, user) session lifecycle with idle/away/timeout policy and
//! running per-user statistics.

mod registry;
mod types;

pub use registry::{SessionRegistry, SweepEvent, AWAY_TIMEOUT, CHAT_TIMEOUT};
pub use types::{RoomKey, Session, UserStats, UserStatus};
