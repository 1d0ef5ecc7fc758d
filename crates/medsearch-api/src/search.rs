//! Search submission gateway (`POST /search`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use medsearch_sources::SourceType;

use crate::backend::SearchBackend;
use crate::error::ApiError;
use crate::http::{check_status, Gateway, HttpApi};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub source_type: SourceType,
    pub user_uid: String,
    pub thread_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_returned_sources: Option<u32>,
}

/// Confirmation that the backend accepted the query for processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchAck {
    #[serde(default)]
    pub message: String,
}

#[async_trait]
impl SearchBackend for HttpApi {
    #[instrument(skip(self, request), fields(thread_uid = %request.thread_uid, source_type = %request.source_type))]
    async fn submit_query(&self, request: &SearchRequest) -> Result<SearchAck, ApiError> {
        let url = self.url(Gateway::Search, "search");
        let req = self.authorize(Gateway::Search, self.client.post(&url)?).await;
        let resp = check_status(req.json(request).send().await?, "search").await?;
        let ack: SearchAck = resp.json().await?;
        info!(message = %ack.message, "Search query accepted");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_payload_matches_gateway_contract() {
        let req = SearchRequest {
            query: "EGFR exon 20".into(),
            source_type: SourceType::Library,
            user_uid: "u".into(),
            thread_uid: "t".into(),
            max_returned_sources: Some(15),
        };
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["source_type"], "library");
        assert_eq!(body["max_returned_sources"], 15);
        assert_eq!(body["thread_uid"], "t");
    }

    #[test]
    fn test_ack_tolerates_missing_message() {
        let ack: SearchAck = serde_json::from_str("{}").unwrap();
        assert_eq!(ack.message, "");
    }
}
