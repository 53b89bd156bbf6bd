//! Dify API HTTP client
//!
//! Talks to a Dify-compatible chat backend: streaming chat messages and
//! file uploads. Credentials and endpoints come from the model selected by
//! the router, not from the client itself.

use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::ModelSpec;
use crate::error::{Error, Result};

use super::types::*;

/// Dify backend client. Cheap to clone; per-model credentials are passed
/// per call.
#[derive(Clone)]
pub struct DifyClient {
    client: Client,
}

impl DifyClient {
    /// Create a new client, optionally routed through an HTTP proxy
    pub fn new(http_proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(std::time::Duration::from_secs(120));
        if let Some(proxy) = http_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(Error::Http)?);
        }
        let client = builder.build().map_err(Error::Http)?;
        Ok(Self { client })
    }

    /// Send a chat message and collect the streamed answer.
    ///
    /// A stale `conversation_id` surfaces as [`Error::ConversationNotFound`];
    /// the caller clears the stored id and retries with an empty one.
    pub async fn chat_messages(
        &self,
        model: &ModelSpec,
        query: &str,
        conversation_id: &str,
        user: &str,
        inputs: HashMap<String, String>,
        files: Vec<FileRef>,
    ) -> Result<ChatAnswer> {
        let url = format!("{}/chat-messages", model.base_url);
        let request = ChatMessagesRequest {
            inputs,
            query: query.to_string(),
            response_mode: "streaming".to_string(),
            conversation_id: conversation_id.to_string(),
            user: user.to_string(),
            files,
            auto_generate_name: false,
        };

        debug!(model = %model.name, %url, "sending chat message");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&model.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!(model = %model.name, "conversation id rejected by backend");
            return Err(Error::ConversationNotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %model.name, %status, "Dify API error: {}", body);
            return Err(Error::DifyApi(format!("{}: {}", status, body)));
        }

        self.collect_stream(response).await
    }

    /// Accumulate the SSE event stream into the final answer
    async fn collect_stream(&self, response: reqwest::Response) -> Result<ChatAnswer> {
        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut answer = String::new();
        let mut conversation_id = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Error::Http)?;
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                handle_stream_line(line.trim(), &mut answer, &mut conversation_id)?;
            }
        }
        if !pending.trim().is_empty() {
            handle_stream_line(pending.trim(), &mut answer, &mut conversation_id)?;
        }

        let answer = answer.trim_end().to_string();
        info!(chars = answer.chars().count(), "chat answer collected");
        Ok(ChatAnswer {
            answer,
            conversation_id,
        })
    }

    /// Upload a file, returning the backend file id
    pub async fn upload_file(
        &self,
        model: &ModelSpec,
        bytes: Vec<u8>,
        mime: &str,
        user: &str,
    ) -> Result<String> {
        let url = format!("{}/files/upload", model.base_url);
        let extension = mime.rsplit('/').next().unwrap_or("bin");
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("file.{}", extension))
            .mime_str(mime)
            .map_err(Error::Http)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("user", user.to_string());

        debug!(model = %model.name, %url, "uploading file");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&model.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;
        if !status.is_success() {
            warn!(%status, "file upload failed: {}", body);
            return Err(Error::DifyApi(format!("upload failed: {}", status)));
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| Error::DifyApi(format!("failed to parse upload response: {}", e)))?;
        Ok(parsed.id)
    }
}

/// Process one line of the SSE stream
fn handle_stream_line(line: &str, answer: &mut String, conversation_id: &mut String) -> Result<()> {
    if line.is_empty() || line == "event: ping" {
        return Ok(());
    }
    let data = line.strip_prefix("data: ").unwrap_or(line);
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            // keep-alive noise and partial frames are not fatal
            debug!("skipping unparseable stream line: {} ({})", data, e);
            return Ok(());
        }
    };

    if let Some(id) = &event.conversation_id {
        if !id.is_empty() {
            conversation_id.clear();
            conversation_id.push_str(id);
        }
    }

    match event.event.as_str() {
        "message" => {
            if let Some(part) = event.answer {
                answer.push_str(&part);
            }
        }
        "message_replace" => {
            *answer = event.answer.unwrap_or_default();
        }
        "error" => {
            return Err(Error::DifyApi(format!(
                "{}: {}",
                event.code.unwrap_or_default(),
                event.message.unwrap_or_default()
            )));
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(base_url: &str) -> ModelSpec {
        ModelSpec {
            name: "chat".to_string(),
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            trigger_words: vec![],
            wakeup_words: vec![],
            price: 0,
        }
    }

    #[test]
    fn test_stream_line_accumulation() {
        let mut answer = String::new();
        let mut conversation_id = String::new();

        handle_stream_line("event: ping", &mut answer, &mut conversation_id).unwrap();
        handle_stream_line(
            r#"data: {"event":"message","answer":"你好","conversation_id":"c-1"}"#,
            &mut answer,
            &mut conversation_id,
        )
        .unwrap();
        handle_stream_line(
            r#"data: {"event":"message","answer":"，世界"}"#,
            &mut answer,
            &mut conversation_id,
        )
        .unwrap();

        assert_eq!(answer, "你好，世界");
        assert_eq!(conversation_id, "c-1");
    }

    #[test]
    fn test_stream_message_replace() {
        let mut answer = "draft".to_string();
        let mut conversation_id = String::new();

        handle_stream_line(
            r#"data: {"event":"message_replace","answer":"final"}"#,
            &mut answer,
            &mut conversation_id,
        )
        .unwrap();
        assert_eq!(answer, "final");
    }

    #[test]
    fn test_stream_error_event() {
        let mut answer = String::new();
        let mut conversation_id = String::new();

        let result = handle_stream_line(
            r#"data: {"event":"error","code":"quota","message":"limit reached"}"#,
            &mut answer,
            &mut conversation_id,
        );
        assert!(matches!(result, Err(Error::DifyApi(_))));
    }

    #[tokio::test]
    async fn test_chat_messages_roundtrip() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"event\":\"message\",\"answer\":\"Hello\",\"conversation_id\":\"c-9\"}\n",
            "event: ping\n",
            "data: {\"event\":\"message\",\"answer\":\" there\"}\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = DifyClient::new(None).unwrap();
        let result = client
            .chat_messages(
                &model(&server.uri()),
                "hi",
                "",
                "chat-1",
                HashMap::new(),
                vec![],
            )
            .await
            .unwrap();

        assert_eq!(result.answer, "Hello there");
        assert_eq!(result.conversation_id, "c-9");
    }

    #[tokio::test]
    async fn test_stale_conversation_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = DifyClient::new(None).unwrap();
        let result = client
            .chat_messages(
                &model(&server.uri()),
                "hi",
                "stale-id",
                "chat-1",
                HashMap::new(),
                vec![],
            )
            .await;
        assert!(matches!(result, Err(Error::ConversationNotFound)));
    }

    #[tokio::test]
    async fn test_upload_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"id":"file-42"}"#),
            )
            .mount(&server)
            .await;

        let client = DifyClient::new(None).unwrap();
        let id = client
            .upload_file(&model(&server.uri()), vec![1, 2, 3], "image/jpeg", "chat-1")
            .await
            .unwrap();
        assert_eq!(id, "file-42");
    }
}
