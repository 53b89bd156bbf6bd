//! Error types for chatroom-core

use thiserror::Error;

/// Main error type for chatroom-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Dify API error: {0}")]
    DifyApi(String),

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for chatroom-core
pub type Result<T> = std::result::Result<T, Error>;
