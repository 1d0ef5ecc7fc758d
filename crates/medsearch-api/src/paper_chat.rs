//! Paper chat gateway (`POST /chat`).
//!
//! The backend is stateless: every turn sends the whole history for the paper
//! and receives the agent's reply as plain text. Errors come back as JSON
//! with either `message` (403 from the gateway) or `error`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::backend::PaperChatBackend;
use crate::error::ApiError;
use crate::http::{Gateway, HttpApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl PaperChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Agent, content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    paper_uid: &'a str,
    message_history: &'a [PaperChatMessage],
}

#[derive(Debug, Default, Deserialize)]
struct ChatErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// `message` wins over `error`, matching what the gateway puts in 403 bodies.
fn chat_error_message(status: u16, body: &str) -> String {
    let parsed: ChatErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| format!("HTTP error {status}"))
}

#[async_trait]
impl PaperChatBackend for HttpApi {
    #[instrument(skip(self, history), fields(turns = history.len()))]
    async fn ask(&self, paper_uid: &str, history: &[PaperChatMessage]) -> Result<String, ApiError> {
        let url = self.url(Gateway::Chat, "chat");
        let req = self.authorize(Gateway::Chat, self.client.post(&url)?).await;
        let resp = req
            .json(&ChatRequestBody { paper_uid, message_history: history })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            debug!(chars = body.len(), "Paper chat reply received");
            return Ok(body);
        }

        let message = chat_error_message(status.as_u16(), &body);
        error!(status = status.as_u16(), %message, "Paper chat API error");
        Err(match status.as_u16() {
            404 => ApiError::NotFound(message),
            code => ApiError::Status { status: code, message },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_serializes_roles_lowercase() {
        let history = vec![PaperChatMessage::user("Summarise"), PaperChatMessage::agent("It shows...")];
        let body = serde_json::to_value(ChatRequestBody { paper_uid: "src_1", message_history: &history }).unwrap();
        assert_eq!(body["paper_uid"], "src_1");
        assert_eq!(body["message_history"][0]["role"], "user");
        assert_eq!(body["message_history"][1]["role"], "agent");
    }

    #[test]
    fn test_error_message_precedence() {
        assert_eq!(chat_error_message(403, r#"{"message": "Forbidden", "error": "x"}"#), "Forbidden");
        assert_eq!(chat_error_message(500, r#"{"error": "Paper text unavailable"}"#), "Paper text unavailable");
        assert_eq!(chat_error_message(502, "<html>bad gateway</html>"), "HTTP error 502");
    }
}
