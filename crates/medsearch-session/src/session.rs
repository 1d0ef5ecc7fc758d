//! Search session: one thread, its optimistic local copy, and the poll task
//! that brings it up to date.
//!
//! Submitting a query runs a strict chain: optimistic local update, thread
//! creation (new threads only), query submission, thread-name update, then
//! polling. A failure anywhere in the chain leaves the optimistic question
//! visible, marks the local thread completed so the search bar unlocks, and
//! is not retried.

use std::sync::Arc;

use chrono::Utc;
use medsearch_api::identity::{self, IdentityProvider};
use medsearch_api::search::SearchRequest;
use medsearch_api::{SearchBackend, SessionBackend, ThreadBackend};
use medsearch_sources::citations::{group_claims, link_claims, ClaimBlock};
use medsearch_sources::{reconcile, ChatMessage, SourceReconciliation, SourceType, StatusIndicator, Thread};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SessionError;
use crate::poller::{PollConfig, PollHandle, PollOutcome, ThreadPoller};

pub const NEW_THREAD_ROUTE: &str = "/search/new";
const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    OptimisticSubmitted,
    Polling { attempt: u32 },
    Completed,
    PollingExhausted,
    Error(String),
}

/// A thread message prepared for display: answers are linked to sources and
/// grouped by the source number the reader sees.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayMessage {
    Question(String),
    Answer(Vec<ClaimBlock>),
}

pub struct SearchSession {
    backend: Arc<dyn SessionBackend>,
    identity: Arc<dyn IdentityProvider>,
    poller: ThreadPoller<dyn SessionBackend>,
    thread: Option<Thread>,
    route: String,
    phase: SessionPhase,
    poll: Option<PollHandle>,
    forward: Option<JoinHandle<()>>,
    phase_tx: Arc<watch::Sender<SessionPhase>>,
}

impl SearchSession {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        identity: Arc<dyn IdentityProvider>,
        config: PollConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        Self {
            poller: ThreadPoller::new(Arc::clone(&backend), config),
            backend,
            identity,
            thread: None,
            route: NEW_THREAD_ROUTE.to_string(),
            phase: SessionPhase::Idle,
            poll: None,
            forward: None,
            phase_tx: Arc::new(phase_tx),
        }
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    /// `/search/new` or `/search/<thread id>`.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.phase, &self.poll) {
            (SessionPhase::Polling { .. }, Some(handle)) => {
                SessionPhase::Polling { attempt: handle.attempts() }
            }
            (phase, _) => phase.clone(),
        }
    }

    /// Phase changes. Attempt progress is forwarded while a poll runs; the
    /// final phase is published once [`Self::wait_for_completion`] folds the
    /// outcome in.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::OptimisticSubmitted | SessionPhase::Polling { .. })
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Input is accepted when there is no thread yet, the thread is empty,
    /// or the last search has completed.
    pub fn is_search_bar_active(&self) -> bool {
        match &self.thread {
            None => true,
            Some(thread) => thread.messages.is_empty() || thread.is_completed(),
        }
    }

    /// Deduplicated sources of the current thread.
    pub fn reconciliation(&self) -> SourceReconciliation {
        self.thread
            .as_ref()
            .map(|thread| reconcile(&thread.sources))
            .unwrap_or_default()
    }

    pub fn display_messages(&self) -> Vec<DisplayMessage> {
        let Some(thread) = &self.thread else {
            return Vec::new();
        };
        let reconciliation = reconcile(&thread.sources);
        thread
            .messages
            .iter()
            .map(|message| match message {
                ChatMessage::Question(text) => DisplayMessage::Question(text.clone()),
                ChatMessage::Answer(claims) => {
                    let linked = link_claims(claims, &thread.sources);
                    DisplayMessage::Answer(group_claims(&linked, &reconciliation))
                }
            })
            .collect()
    }

    /// Navigate to a thread. `"new"` clears the session; anything else loads
    /// the thread and resumes polling when it is still running.
    #[instrument(skip(self))]
    pub async fn open(&mut self, thread_uid: &str) -> Result<(), SessionError> {
        self.stop_polling();

        if thread_uid == "new" {
            self.thread = None;
            self.route = NEW_THREAD_ROUTE.to_string();
            self.set_phase(SessionPhase::Idle);
            return Ok(());
        }

        self.route = format!("/search/{thread_uid}");
        let mut thread = match self.backend.fetch_thread(thread_uid).await {
            Ok(thread) => thread,
            Err(e) => {
                error!(%thread_uid, "Failed to load thread: {e}");
                self.thread = None;
                self.set_phase(SessionPhase::Error(e.to_string()));
                return Err(e.into());
            }
        };
        if thread.source_type.is_none() {
            thread.source_type = Some(SourceType::Pubmed);
        }

        let resume = !thread.messages.is_empty() && !thread.is_completed();
        debug!(messages = thread.messages.len(), resume, "Thread loaded");
        self.thread = Some(thread);

        if resume {
            self.start_polling(thread_uid);
        } else {
            self.set_phase(SessionPhase::Idle);
        }
        Ok(())
    }

    /// Submit a query on the current thread, creating one first when the
    /// session is on `/search/new`. Returns once polling has started.
    #[instrument(skip(self))]
    pub async fn submit(
        &mut self,
        query: &str,
        source_type: SourceType,
        max_sources: Option<u32>,
    ) -> Result<(), SessionError> {
        if !self.is_search_bar_active() {
            return Err(SessionError::Busy);
        }

        // A temporary id means creation never reached the backend.
        let needs_create = self
            .thread
            .as_ref()
            .map_or(true, |thread| thread.thread_uid.starts_with(TEMP_ID_PREFIX));
        self.apply_optimistic(query);

        match self.submit_remote(query, source_type, max_sources, needs_create).await {
            Ok(thread_uid) => {
                self.start_polling(&thread_uid);
                Ok(())
            }
            Err(e) => {
                error!("Search submission failed: {e}");
                if let Some(thread) = self.thread.as_mut() {
                    thread.status_indicator = StatusIndicator::Completed;
                }
                self.set_phase(SessionPhase::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn apply_optimistic(&mut self, query: &str) {
        let thread = self.thread.get_or_insert_with(|| {
            let temp_id = format!("{TEMP_ID_PREFIX}{}", Utc::now().timestamp_millis());
            Thread::skeleton(temp_id, "", None)
        });
        thread.push_question(query);
        thread.status_indicator = StatusIndicator::Searching;

        if thread.thread_uid.starts_with(TEMP_ID_PREFIX) {
            self.route = format!("/search/{}", thread.thread_uid);
        }
        self.set_phase(SessionPhase::OptimisticSubmitted);
    }

    async fn submit_remote(
        &mut self,
        query: &str,
        source_type: SourceType,
        max_sources: Option<u32>,
        needs_create: bool,
    ) -> Result<String, SessionError> {
        let user_uid = identity::require_user(self.identity.as_ref()).await?;

        if needs_create {
            let created = self.backend.create_thread(&user_uid, query, Some(source_type)).await?;
            info!(thread_uid = %created.thread_uid, "Replacing temporary thread id");
            if let Some(thread) = self.thread.as_mut() {
                thread.thread_uid = created.thread_uid.clone();
                thread.owner_uid = created.owner_uid;
                thread.source_type = Some(source_type);
            }
            self.route = format!("/search/{}", created.thread_uid);
        }

        let thread_uid = self
            .thread
            .as_ref()
            .map(|thread| thread.thread_uid.clone())
            .unwrap_or_default();

        let request = SearchRequest {
            query: query.to_string(),
            source_type,
            user_uid: user_uid.clone(),
            thread_uid: thread_uid.clone(),
            max_returned_sources: max_sources,
        };
        let ack = self.backend.submit_query(&request).await?;
        debug!(message = %ack.message, "Search accepted");

        self.backend
            .update_thread_metadata(&user_uid, &thread_uid, query, Some(source_type))
            .await?;

        Ok(thread_uid)
    }

    /// Start (or restart) polling. Any earlier poll is cancelled first.
    pub fn start_polling(&mut self, thread_uid: &str) {
        self.stop_polling();
        let handle = self.poller.start(thread_uid);
        let mut progress = handle.progress();
        self.poll = Some(handle);
        self.set_phase(SessionPhase::Polling { attempt: 0 });

        // Ends when the poll task finishes or is aborted and its sender drops.
        let phase_tx = Arc::clone(&self.phase_tx);
        self.forward = Some(tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let attempt = *progress.borrow_and_update();
                phase_tx.send_if_modified(|phase| match phase {
                    SessionPhase::Polling { attempt: current } if *current != attempt => {
                        *current = attempt;
                        true
                    }
                    _ => false,
                });
            }
        }));
    }

    pub fn stop_polling(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
    }

    /// Wait for the running poll and fold its outcome into the session.
    pub async fn wait_for_completion(&mut self) -> SessionPhase {
        let Some(handle) = self.poll.as_mut() else {
            return self.phase();
        };
        let outcome = handle.outcome().await;
        self.stop_polling();

        match outcome {
            Some(PollOutcome::Completed(mut thread)) => {
                if thread.source_type.is_none() {
                    thread.source_type = Some(SourceType::Pubmed);
                }
                self.thread = Some(thread);
                self.set_phase(SessionPhase::Completed);
            }
            Some(PollOutcome::Exhausted { attempts }) => {
                warn!(attempts, "Answer not ready, stopped polling");
                self.set_phase(SessionPhase::PollingExhausted);
            }
            Some(PollOutcome::Failed(e)) => {
                error!("Error polling thread: {e}");
                self.set_phase(SessionPhase::Error(e.to_string()));
            }
            None => self.set_phase(SessionPhase::Idle),
        }
        self.phase()
    }

    /// Leave the thread view; the poll task is released.
    pub fn detach(&mut self) {
        self.stop_polling();
        if self.is_loading() {
            self.set_phase(SessionPhase::Idle);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase.clone();
        self.phase_tx.send_replace(phase);
    }
}
