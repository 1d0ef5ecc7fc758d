//! Thread status polling.
//!
//! After a query is accepted the backend fills the thread asynchronously. The
//! poller checks the status endpoint right away and then on a fixed interval
//! until the thread reports `completed`, a hard error occurs, or the attempt
//! cap is reached.
//!
//! A 404 from either the status or the thread endpoint means the record has
//! not propagated yet. Such attempts are logged and still count toward the
//! cap, so a poll never outlives `max_attempts × interval`.

use std::sync::Arc;
use std::time::Duration;

use medsearch_api::{ApiError, ThreadBackend};
use medsearch_sources::{StatusIndicator, Thread};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Status reached `completed` and the full thread was fetched.
    Completed(Thread),
    /// The cap was reached without completion. Not an error.
    Exhausted { attempts: u32 },
    /// A non-transient error stopped the loop.
    Failed(ApiError),
}

/// Owns the background poll task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct PollHandle {
    thread_uid: String,
    task: Option<JoinHandle<PollOutcome>>,
    attempts: watch::Receiver<u32>,
}

impl PollHandle {
    pub fn thread_uid(&self) -> &str {
        &self.thread_uid
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        *self.attempts.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    /// Attempt counter updates; the channel closes when the task ends.
    pub fn progress(&self) -> watch::Receiver<u32> {
        self.attempts.clone()
    }

    /// Wait for the poll to end. `None` when the task was cancelled.
    ///
    /// The task stays owned by the handle until it resolves, so dropping this
    /// future part way leaves the handle able to abort it.
    pub async fn outcome(&mut self) -> Option<PollOutcome> {
        let result = self.task.as_mut()?.await;
        self.task = None;
        match result {
            Ok(outcome) => Some(outcome),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => None,
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(thread_uid = %self.thread_uid, "Cancelling thread poll");
            }
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Spawns poll tasks against one backend.
pub struct ThreadPoller<B: ThreadBackend + ?Sized> {
    backend: Arc<B>,
    config: PollConfig,
}

impl<B: ThreadBackend + ?Sized> Clone for ThreadPoller<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend), config: self.config }
    }
}

impl<B: ThreadBackend + ?Sized + 'static> ThreadPoller<B> {
    pub fn new(backend: Arc<B>, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Start polling `thread_uid` on the current runtime.
    pub fn start(&self, thread_uid: impl Into<String>) -> PollHandle {
        let thread_uid = thread_uid.into();
        let (attempts_tx, attempts_rx) = watch::channel(0);
        let backend = Arc::clone(&self.backend);
        let config = self.config;
        let uid = thread_uid.clone();

        let task = tokio::spawn(async move {
            poll_until_complete(backend.as_ref(), &uid, config, &attempts_tx).await
        });

        PollHandle { thread_uid, task: Some(task), attempts: attempts_rx }
    }
}

/// The poll loop itself; first check is immediate.
pub async fn poll_until_complete<B>(
    backend: &B,
    thread_uid: &str,
    config: PollConfig,
    attempts_tx: &watch::Sender<u32>,
) -> PollOutcome
where
    B: ThreadBackend + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    // tokio rejects a zero period.
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0;
    info!(%thread_uid, max_attempts, "Polling thread status");

    loop {
        ticker.tick().await;
        attempts += 1;
        attempts_tx.send_replace(attempts);

        match check_once(backend, thread_uid).await {
            Ok(Some(thread)) => {
                info!(%thread_uid, attempts, "Thread completed");
                return PollOutcome::Completed(thread);
            }
            Ok(None) => {}
            Err(e) if e.is_transient_poll_error() => {
                debug!(%thread_uid, attempts, "Thread not available yet: {e}");
            }
            Err(e) => {
                warn!(%thread_uid, attempts, "Polling stopped: {e}");
                return PollOutcome::Failed(e);
            }
        }

        if attempts >= max_attempts {
            warn!(%thread_uid, attempts, "Polling gave up before the thread completed");
            return PollOutcome::Exhausted { attempts };
        }
    }
}

async fn check_once<B>(backend: &B, thread_uid: &str) -> Result<Option<Thread>, ApiError>
where
    B: ThreadBackend + ?Sized,
{
    let token = backend.thread_status(thread_uid).await?;
    match StatusIndicator::from_token(&token) {
        Some(StatusIndicator::Completed) => backend.fetch_thread(thread_uid).await.map(Some),
        Some(status) => {
            debug!(%thread_uid, status = status.as_str(), "Thread still running");
            Ok(None)
        }
        None => {
            warn!(%thread_uid, %token, "Unknown thread status, treating as pending");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_gateway_cadence() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 30);
    }
}
