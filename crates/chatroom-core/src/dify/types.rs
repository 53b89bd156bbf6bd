//! Dify API request/response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request body for `POST /chat-messages`
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessagesRequest {
    /// App-defined input variables (user id / nickname in this deployment)
    pub inputs: HashMap<String, String>,
    pub query: String,
    pub response_mode: String,
    /// Empty string starts a new conversation
    pub conversation_id: String,
    /// End-user identifier, the chat id here
    pub user: String,
    pub files: Vec<FileRef>,
    pub auto_generate_name: bool,
}

/// A previously-uploaded file attached to a chat message
#[derive(Debug, Clone, Serialize)]
pub struct FileRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: String,
    pub upload_file_id: String,
}

impl FileRef {
    /// Reference an image uploaded via `/files/upload`
    pub fn image(upload_file_id: impl Into<String>) -> Self {
        Self {
            kind: "image".to_string(),
            transfer_method: "local_file".to_string(),
            upload_file_id: upload_file_id.into(),
        }
    }
}

/// One event of the streaming response. Only the fields this client reads
/// are modeled; unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Error detail on `event = "error"`
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Response of `POST /files/upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}

/// Final result of a chat call: the accumulated answer plus the
/// conversation id to persist for the next turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    pub conversation_id: String,
}
