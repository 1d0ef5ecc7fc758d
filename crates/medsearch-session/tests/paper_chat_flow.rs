//! Paper chat against in-memory library and chat backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use medsearch_api::library::{FolderInfo, StoredSource, UploadTicket};
use medsearch_api::paper_chat::{ChatRole, PaperChatMessage};
use medsearch_api::{ApiError, LibraryBackend, PaperChatBackend};
use medsearch_session::{PaperChatSession, SessionError, SessionStore};

struct OnePaperLibrary {
    source: StoredSource,
}

#[async_trait]
impl LibraryBackend for OnePaperLibrary {
    async fn list_sources(&self, _path: Option<&str>) -> Result<Vec<StoredSource>, ApiError> {
        Ok(vec![self.source.clone()])
    }

    async fn get_source(&self, source_id: &str) -> Result<StoredSource, ApiError> {
        if self.source.source_id.as_deref() == Some(source_id) {
            Ok(self.source.clone())
        } else {
            Err(ApiError::NotFound(format!("Source {source_id} not found")))
        }
    }

    async fn add_source(&self, source: StoredSource) -> Result<StoredSource, ApiError> {
        Ok(source)
    }

    async fn delete_source(&self, _source_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn move_source(&self, _source_id: &str, _new_path: &str) -> Result<StoredSource, ApiError> {
        Ok(self.source.clone())
    }

    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError> {
        Ok(vec![])
    }

    async fn create_folder(&self, folder: FolderInfo) -> Result<FolderInfo, ApiError> {
        Ok(folder)
    }

    async fn delete_folder(&self, _folder_path: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn upload_url(
        &self,
        _filename: &str,
        _content_type: &str,
        _title: Option<&str>,
    ) -> Result<UploadTicket, ApiError> {
        Err(ApiError::Upload("not supported".into()))
    }

    async fn upload_to_presigned(&self, _ticket: &UploadTicket, _body: Vec<u8>) -> Result<bool, ApiError> {
        Ok(false)
    }

    async fn register_upload(&self, _key: &str, _title: &str, _path: &str) -> Result<StoredSource, ApiError> {
        Err(ApiError::Upload("not supported".into()))
    }
}

/// Echoes the turn count; fails once when `fail_next` is set.
#[derive(Default)]
struct RecordingChat {
    seen: Mutex<Vec<(String, Vec<PaperChatMessage>)>>,
    fail_next: Mutex<bool>,
}

#[async_trait]
impl PaperChatBackend for RecordingChat {
    async fn ask(&self, paper_uid: &str, history: &[PaperChatMessage]) -> Result<String, ApiError> {
        self.seen.lock().unwrap().push((paper_uid.to_string(), history.to_vec()));
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(ApiError::Status { status: 403, message: "Forbidden".into() });
        }
        Ok(format!("reply to {} messages", history.len()))
    }
}

fn paper(text_url: Option<&str>) -> StoredSource {
    StoredSource {
        source_id: Some("src_ab12cd34".into()),
        title: "KRAS G12C inhibition in NSCLC".into(),
        s3_text_url: text_url.map(str::to_string),
        ..Default::default()
    }
}

fn chat_session(source: StoredSource, chat: &Arc<RecordingChat>) -> PaperChatSession {
    PaperChatSession::new(chat.clone(), Arc::new(OnePaperLibrary { source }))
}

#[tokio::test]
async fn test_full_history_is_sent_every_turn() {
    let chat = Arc::new(RecordingChat::default());
    let mut session = chat_session(paper(Some("texts/src_ab12cd34.txt")), &chat);

    session.open("src_ab12cd34").await.unwrap();
    assert_eq!(session.send("What is the main finding?").await.unwrap().as_deref(), Some("reply to 1 messages"));
    assert_eq!(session.send("And the cohort size?").await.unwrap().as_deref(), Some("reply to 3 messages"));

    let seen = chat.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "texts/src_ab12cd34.txt");
    assert_eq!(seen[1].1.len(), 3);
    assert_eq!(seen[1].1[1].role, ChatRole::Agent);
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn test_failed_turn_keeps_user_message() {
    let chat = Arc::new(RecordingChat::default());
    *chat.fail_next.lock().unwrap() = true;
    let mut session = chat_session(paper(Some("texts/p.txt")), &chat);
    session.open("src_ab12cd34").await.unwrap();

    let err = session.send("Summarise").await.unwrap_err();
    assert!(matches!(err, SessionError::Api(ApiError::Status { status: 403, .. })));
    assert_eq!(session.history(), &[PaperChatMessage::user("Summarise")]);
    assert!(session.chat_error().unwrap().contains("Forbidden"));

    session.send("Summarise again").await.unwrap();
    assert!(session.chat_error().is_none());
    assert_eq!(session.history().len(), 3);
}

#[tokio::test]
async fn test_missing_text_url_blocks_sending() {
    let chat = Arc::new(RecordingChat::default());
    let mut session = chat_session(paper(None), &chat);

    assert!(matches!(session.send("hi").await, Err(SessionError::NoPaper)));

    session.open("src_ab12cd34").await.unwrap();
    assert!(matches!(session.send("hi").await, Err(SessionError::MissingPaperText)));
    assert!(session.history().is_empty());
    assert!(chat.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_source_records_error() {
    let chat = Arc::new(RecordingChat::default());
    let mut session = chat_session(paper(Some("texts/p.txt")), &chat);

    assert!(session.open("src_missing").await.is_err());
    assert!(session.source().is_none());
    assert!(session.source_error().unwrap().starts_with("Failed to load paper details"));
}

#[tokio::test]
async fn test_context_round_trips_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let chat = Arc::new(RecordingChat::default());

    let mut session = chat_session(paper(Some("texts/p.txt")), &chat);
    session.open("src_ab12cd34").await.unwrap();
    session.send("Question one").await.unwrap();

    let mut store = SessionStore::hydrate(&path).unwrap();
    store.set_chat(session.context().clone()).unwrap();

    let store = SessionStore::hydrate(&path).unwrap();
    let library = Arc::new(OnePaperLibrary { source: paper(Some("texts/p.txt")) });
    let mut resumed = PaperChatSession::restore(chat.clone(), library, store.chat().clone());
    assert_eq!(resumed.history().len(), 2);

    // Reopening the same paper keeps the conversation; another paper would reset it.
    resumed.open("src_ab12cd34").await.unwrap();
    resumed.send("Question two").await.unwrap();
    assert_eq!(chat.seen.lock().unwrap()[1].1.len(), 3);
}
