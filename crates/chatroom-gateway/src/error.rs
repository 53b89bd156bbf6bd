//! Error types for chatroom-gateway

use thiserror::Error;

/// chatroom-gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Core error: {0}")]
    Core(#[from] chatroom_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
