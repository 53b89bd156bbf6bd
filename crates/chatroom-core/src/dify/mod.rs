//! Dify backend integration

mod client;
mod types;

pub use client::DifyClient;
pub use types::{ChatAnswer, ChatMessagesRequest, FileRef, StreamEvent, UploadResponse};
