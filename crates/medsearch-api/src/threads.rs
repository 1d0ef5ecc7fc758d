//! Thread management gateway.
//!
//! Endpoints used:
//!   GET    /thread/{id}/status
//!   GET    /thread/{id}
//!   POST   /thread
//!   DELETE /thread/{id}                               (creation rollback)
//!   GET    /user_metadata/{user}
//!   POST   /user_metadata/{user}/thread
//!   PUT    /user_metadata/{user}/thread/{id}
//!   DELETE /user_metadata/{user}/thread_ownership/{id}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use medsearch_sources::{SourceType, Thread, ThreadRef, UserMetadata};

use crate::backend::ThreadBackend;
use crate::error::ApiError;
use crate::http::{check_status, encode_component, Gateway, HttpApi};

#[derive(Debug, Serialize)]
struct ThreadMetadataUpdate<'a> {
    thread_name: &'a str,
    source_type: Option<SourceType>,
}

#[derive(Debug, Deserialize)]
struct UserThreads {
    #[serde(default)]
    thread_refs: Vec<ThreadRef>,
}

#[async_trait]
impl ThreadBackend for HttpApi {
    #[instrument(skip(self))]
    async fn thread_status(&self, thread_uid: &str) -> Result<String, ApiError> {
        let url = self.url(Gateway::Threads, &format!("thread/{}/status", encode_component(thread_uid)));
        let req = self.authorize(Gateway::Threads, self.client.get(&url)?).await;
        let resp = check_status(req.send().await?, "fetch thread status").await?;

        // The status endpoint returns a bare JSON string.
        let status: String = resp.json().await?;
        debug!(%status, "Thread status");
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn fetch_thread(&self, thread_uid: &str) -> Result<Thread, ApiError> {
        let url = self.url(Gateway::Threads, &format!("thread/{}", encode_component(thread_uid)));
        let req = self.authorize(Gateway::Threads, self.client.get(&url)?).await;
        let resp = check_status(req.send().await?, "fetch thread").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn create_thread(
        &self,
        user_uid: &str,
        thread_name: &str,
        source_type: Option<SourceType>,
    ) -> Result<Thread, ApiError> {
        let thread = Thread::skeleton(Uuid::new_v4().to_string(), user_uid, source_type);

        let url = self.url(Gateway::Threads, "thread");
        let req = self.authorize(Gateway::Threads, self.client.post(&url)?).await;
        check_status(req.json(&thread).send().await?, "create thread").await?;

        let thread_ref = ThreadRef {
            thread_uid: thread.thread_uid.clone(),
            thread_name: thread_name.to_string(),
            source_type,
        };
        let url = self.url(Gateway::Threads, &format!("user_metadata/{}/thread", encode_component(user_uid)));
        let req = self.authorize(Gateway::Threads, self.client.post(&url)?).await;
        let mapping = req.json(&thread_ref).send().await?;

        if let Err(e) = check_status(mapping, "create thread mapping").await {
            // Roll back the orphaned thread record; the mapping error is what the caller sees.
            warn!(thread_uid = %thread.thread_uid, "Thread mapping failed, deleting thread: {e}");
            let url = self.url(Gateway::Threads, &format!("thread/{}", encode_component(&thread.thread_uid)));
            let req = self.authorize(Gateway::Threads, self.client.delete(&url)?).await;
            if let Err(rollback) = req.send().await {
                warn!("Thread rollback failed: {rollback}");
            }
            return Err(e);
        }

        info!(thread_uid = %thread.thread_uid, "Thread created");
        Ok(thread)
    }

    #[instrument(skip(self))]
    async fn update_thread_metadata(
        &self,
        user_uid: &str,
        thread_uid: &str,
        thread_name: &str,
        source_type: Option<SourceType>,
    ) -> Result<UserMetadata, ApiError> {
        let url = self.url(
            Gateway::Threads,
            &format!("user_metadata/{}/thread/{}", encode_component(user_uid), encode_component(thread_uid)),
        );
        let req = self.authorize(Gateway::Threads, self.client.put(&url)?).await;
        let resp = req
            .json(&ThreadMetadataUpdate { thread_name, source_type })
            .send()
            .await?;
        let resp = check_status(resp, "update thread metadata").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn list_threads(&self, user_uid: &str) -> Result<Vec<ThreadRef>, ApiError> {
        let url = self.url(Gateway::Threads, &format!("user_metadata/{}", encode_component(user_uid)));
        let req = self.authorize(Gateway::Threads, self.client.get(&url)?).await;
        let resp = check_status(req.send().await?, "fetch user threads").await?;
        let threads: UserThreads = resp.json().await?;
        Ok(threads.thread_refs)
    }

    #[instrument(skip(self))]
    async fn delete_thread(&self, user_uid: &str, thread_uid: &str) -> Result<(), ApiError> {
        let url = self.url(
            Gateway::Threads,
            &format!(
                "user_metadata/{}/thread_ownership/{}",
                encode_component(user_uid),
                encode_component(thread_uid)
            ),
        );
        let req = self.authorize(Gateway::Threads, self.client.delete(&url)?).await;
        check_status(req.send().await?, "delete thread").await?;
        Ok(())
    }
}
