//! Gateway traits.
//!
//! Implementations:
//!   HttpApi: the deployed REST gateways, through the sandboxed client
//!   tests: in-memory fakes with scripted responses

use async_trait::async_trait;
use medsearch_sources::{SourceType, Thread, ThreadRef, UserMetadata};

use crate::error::ApiError;
use crate::library::{FolderInfo, StoredSource, UploadTicket};
use crate::paper_chat::PaperChatMessage;
use crate::search::{SearchAck, SearchRequest};

// ── Threads ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ThreadBackend: Send + Sync {
    /// Raw status token: `searching`, `processing` or `completed`.
    async fn thread_status(&self, thread_uid: &str) -> Result<String, ApiError>;

    async fn fetch_thread(&self, thread_uid: &str) -> Result<Thread, ApiError>;

    /// Create a thread with a client-generated id and register it in the
    /// user's metadata under `thread_name`.
    async fn create_thread(
        &self,
        user_uid: &str,
        thread_name: &str,
        source_type: Option<SourceType>,
    ) -> Result<Thread, ApiError>;

    async fn update_thread_metadata(
        &self,
        user_uid: &str,
        thread_uid: &str,
        thread_name: &str,
        source_type: Option<SourceType>,
    ) -> Result<UserMetadata, ApiError>;

    async fn list_threads(&self, user_uid: &str) -> Result<Vec<ThreadRef>, ApiError>;

    async fn delete_thread(&self, user_uid: &str, thread_uid: &str) -> Result<(), ApiError>;
}

// ── Search ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fire-and-forget submission; the answer lands in the thread record later.
    async fn submit_query(&self, request: &SearchRequest) -> Result<SearchAck, ApiError>;
}

/// Everything a search session needs from the backend.
pub trait SessionBackend: ThreadBackend + SearchBackend {}

impl<T: ThreadBackend + SearchBackend> SessionBackend for T {}

// ── Library ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LibraryBackend: Send + Sync {
    async fn list_sources(&self, path: Option<&str>) -> Result<Vec<StoredSource>, ApiError>;
    async fn get_source(&self, source_id: &str) -> Result<StoredSource, ApiError>;
    async fn add_source(&self, source: StoredSource) -> Result<StoredSource, ApiError>;
    async fn delete_source(&self, source_id: &str) -> Result<(), ApiError>;
    async fn move_source(&self, source_id: &str, new_path: &str) -> Result<StoredSource, ApiError>;

    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError>;
    async fn create_folder(&self, folder: FolderInfo) -> Result<FolderInfo, ApiError>;
    async fn delete_folder(&self, folder_path: &str) -> Result<(), ApiError>;

    async fn upload_url(
        &self,
        filename: &str,
        content_type: &str,
        title: Option<&str>,
    ) -> Result<UploadTicket, ApiError>;
    /// PUT the file body to a presigned URL. Returns whether storage accepted it.
    async fn upload_to_presigned(&self, ticket: &UploadTicket, body: Vec<u8>) -> Result<bool, ApiError>;
    async fn register_upload(&self, key: &str, title: &str, path: &str) -> Result<StoredSource, ApiError>;
}

// ── Paper chat ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait PaperChatBackend: Send + Sync {
    /// Send the full history for one paper, returning the agent's reply text.
    async fn ask(&self, paper_uid: &str, history: &[PaperChatMessage]) -> Result<String, ApiError>;
}
