//! Chat about one saved paper.
//!
//! The chat backend is stateless, so the session keeps the history and sends
//! all of it with every turn. The paper is addressed by its extracted-text
//! object (`s3_text_url`), not by the library id.

use std::sync::Arc;

use medsearch_api::library::StoredSource;
use medsearch_api::paper_chat::PaperChatMessage;
use medsearch_api::{LibraryBackend, PaperChatBackend};
use tracing::{error, info, instrument};

use crate::error::SessionError;
use crate::store::ChatContext;

pub struct PaperChatSession {
    chat: Arc<dyn PaperChatBackend>,
    library: Arc<dyn LibraryBackend>,
    context: ChatContext,
    source_error: Option<String>,
    chat_error: Option<String>,
}

impl PaperChatSession {
    pub fn new(chat: Arc<dyn PaperChatBackend>, library: Arc<dyn LibraryBackend>) -> Self {
        Self::restore(chat, library, ChatContext::default())
    }

    /// Resume from a persisted context.
    pub fn restore(
        chat: Arc<dyn PaperChatBackend>,
        library: Arc<dyn LibraryBackend>,
        context: ChatContext,
    ) -> Self {
        Self { chat, library, context, source_error: None, chat_error: None }
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    pub fn history(&self) -> &[PaperChatMessage] {
        &self.context.message_history
    }

    pub fn source(&self) -> Option<&StoredSource> {
        self.context.source_data.as_ref()
    }

    pub fn source_error(&self) -> Option<&str> {
        self.source_error.as_deref()
    }

    pub fn chat_error(&self) -> Option<&str> {
        self.chat_error.as_deref()
    }

    /// Load the paper. Switching to a different paper starts a fresh history.
    #[instrument(skip(self))]
    pub async fn open(&mut self, source_id: &str) -> Result<&StoredSource, SessionError> {
        if self.context.current_source_id.as_deref() != Some(source_id) {
            self.context = ChatContext::default();
        }
        self.context.current_source_id = Some(source_id.to_string());
        self.source_error = None;

        match self.library.get_source(source_id).await {
            Ok(source) => {
                info!(title = %source.display_title(), "Paper loaded for chat");
                Ok(self.context.source_data.insert(source))
            }
            Err(e) => {
                error!(%source_id, "Error fetching source data: {e}");
                self.source_error = Some(format!("Failed to load paper details: {e}"));
                self.context.source_data = None;
                Err(e.into())
            }
        }
    }

    /// Send one user turn with the full history. On failure the user message
    /// stays in the history and the error is kept in `chat_error`.
    #[instrument(skip(self, message))]
    pub async fn send(&mut self, message: &str) -> Result<Option<String>, SessionError> {
        let Some(paper_uid) = self.context.source_data.as_ref().and_then(|s| s.s3_text_url.clone()) else {
            let err = if self.context.current_source_id.is_none() {
                SessionError::NoPaper
            } else {
                SessionError::MissingPaperText
            };
            self.chat_error = Some(err.to_string());
            return Err(err);
        };
        if message.trim().is_empty() {
            return Ok(None);
        }

        self.context.message_history.push(PaperChatMessage::user(message));
        self.chat_error = None;

        match self.chat.ask(&paper_uid, &self.context.message_history).await {
            Ok(reply) => {
                self.context.message_history.push(PaperChatMessage::agent(reply.clone()));
                Ok(Some(reply))
            }
            Err(e) => {
                error!("Error fetching chat response: {e}");
                self.chat_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}
