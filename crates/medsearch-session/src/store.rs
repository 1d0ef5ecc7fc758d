//! Persisted UI context.
//!
//! One JSON file holds what survives between runs: the sidebar flag, the
//! active thread, the selected source type (global and per thread) and the
//! paper-chat context. Every setter writes the file back.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use medsearch_api::library::StoredSource;
use medsearch_api::paper_chat::PaperChatMessage;
use medsearch_common::MedsearchError;
use medsearch_sources::SourceType;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatContext {
    pub current_source_id: Option<String>,
    pub message_history: Vec<PaperChatMessage>,
    pub source_data: Option<StoredSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub sidebar_collapsed: bool,
    pub active_thread_id: Option<String>,
    pub global_selected_source: SourceType,
    pub thread_sources: HashMap<String, SourceType>,
    pub chat: ChatContext,
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    state: SessionState,
}

impl SessionStore {
    /// Load the store from `path`. A missing file starts empty; an
    /// unreadable one is logged and replaced on the next write.
    pub fn hydrate(path: impl Into<PathBuf>) -> Result<Self, MedsearchError> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Discarding unreadable session file: {e}");
                SessionState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Session state loaded");
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn persist(&self) -> Result<(), MedsearchError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.state)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&mut self, f: impl FnOnce(&mut SessionState)) -> Result<(), MedsearchError> {
        f(&mut self.state);
        self.persist()
    }

    // ── Sidebar and navigation ───────────────────────────────────────────────

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) -> Result<(), MedsearchError> {
        self.update(|s| s.sidebar_collapsed = collapsed)
    }

    pub fn toggle_sidebar(&mut self) -> Result<bool, MedsearchError> {
        self.update(|s| s.sidebar_collapsed = !s.sidebar_collapsed)?;
        Ok(self.state.sidebar_collapsed)
    }

    pub fn set_active_thread(&mut self, thread_uid: Option<&str>) -> Result<(), MedsearchError> {
        self.update(|s| s.active_thread_id = thread_uid.map(str::to_string))
    }

    /// Forget a deleted thread everywhere it is referenced.
    pub fn forget_thread(&mut self, thread_uid: &str) -> Result<(), MedsearchError> {
        self.update(|s| {
            s.thread_sources.remove(thread_uid);
            if s.active_thread_id.as_deref() == Some(thread_uid) {
                s.active_thread_id = None;
            }
        })
    }

    // ── Source selection ─────────────────────────────────────────────────────

    /// Source type for `thread_uid`, falling back to the global selection.
    pub fn selected_source(&self, thread_uid: Option<&str>) -> SourceType {
        thread_uid
            .and_then(|uid| self.state.thread_sources.get(uid).copied())
            .unwrap_or(self.state.global_selected_source)
    }

    /// Update the global selection and, when given, the thread's own.
    pub fn set_selected_source(
        &mut self,
        source_type: SourceType,
        thread_uid: Option<&str>,
    ) -> Result<(), MedsearchError> {
        self.update(|s| {
            s.global_selected_source = source_type;
            if let Some(uid) = thread_uid {
                s.thread_sources.insert(uid.to_string(), source_type);
            }
        })
    }

    // ── Paper chat ───────────────────────────────────────────────────────────

    pub fn chat(&self) -> &ChatContext {
        &self.state.chat
    }

    pub fn set_chat(&mut self, chat: ChatContext) -> Result<(), MedsearchError> {
        self.update(|s| s.chat = chat)
    }

    pub fn clear_chat(&mut self) -> Result<(), MedsearchError> {
        self.update(|s| s.chat = ChatContext::default())
    }

    /// Drop all state, e.g. on sign-out.
    pub fn reset(&mut self) -> Result<(), MedsearchError> {
        self.state = SessionState::default();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
