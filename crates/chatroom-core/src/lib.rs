//! chatroom-core: Chat Room Gateway Core Library
//!
//! Session management, message buffering/debouncing, keyword-driven model
//! routing, and the Dify backend client for a group-chat LLM gateway.

pub mod buffer;
pub mod config;
pub mod dify;
pub mod error;
pub mod manager;
pub mod router;
pub mod session;
pub mod store;
pub mod transport;

pub use buffer::{BufferTable, FlushPayload, DEBOUNCE_WINDOW, MAX_BUFFERED};
pub use config::{Config, ModelSpec};
pub use dify::{ChatAnswer, DifyClient, FileRef};
pub use error::{Error, Result};
pub use manager::{ChatRoomManager, RANKING_LIMIT, UNKNOWN_USER};
pub use router::{ModelRouter, Route, SWITCH_SUFFIX};
pub use session::{
    RoomKey, SessionRegistry, SweepEvent, UserStats, UserStatus, AWAY_TIMEOUT, CHAT_TIMEOUT,
};
pub use store::BotStore;
pub use transport::{ChatMessage, ChatTransport};
