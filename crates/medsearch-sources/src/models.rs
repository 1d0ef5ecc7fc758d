//! Data models for threads, messages and per-turn citation records.
//!
//! Wire names follow the search backend. Descriptive fields are defaulted so
//! partially populated records normalise here instead of leaking `null`s into
//! reconciliation or polling.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A citation record as returned by the search backend for one query turn.
/// The same paper may reappear in later turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    #[serde(default, deserialize_with = "null_as_default")]
    pub pmid: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub journal: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub publication_date: String,
    #[serde(rename = "abstract", default, deserialize_with = "null_as_default")]
    pub abstract_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mesh_terms: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub publication_type: Vec<String>,
    #[serde(default)]
    pub pmc_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citation_format: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub number_of_citations: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relevancy_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_full_text_available: bool,
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Backend-driven processing state of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    #[default]
    Searching,
    Processing,
    Completed,
}

impl StatusIndicator {
    /// Parse a status token from `GET /thread/{id}/status`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "searching"  => Some(StatusIndicator::Searching),
            "processing" => Some(StatusIndicator::Processing),
            "completed"  => Some(StatusIndicator::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusIndicator::Searching  => "searching",
            StatusIndicator::Processing => "processing",
            StatusIndicator::Completed  => "completed",
        }
    }
}

/// Which corpus a query runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Pubmed,
    Library,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pubmed  => "pubmed",
            SourceType::Library => "library",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pubmed"  => Ok(SourceType::Pubmed),
            "library" => Ok(SourceType::Library),
            other => Err(format!("unknown source type '{other}' (expected pubmed or library)")),
        }
    }
}

/// One claim of an AI answer, as stored on the thread.
/// `source_id` references a [`RawSource`] by pmid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerClaim {
    #[serde(default)]
    pub claim: String,
    #[serde(default)]
    pub relevant_source_quote: String,
    #[serde(default)]
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ChatMessage {
    Question(String),
    Answer(Vec<AnswerClaim>),
}

/// A persisted conversation: alternating question/answer turns plus the raw
/// sources of every turn, concatenated in turn order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_uid: String,
    #[serde(default)]
    pub owner_uid: String,
    #[serde(default)]
    pub shared_with: Vec<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub status_indicator: StatusIndicator,
    #[serde(default)]
    pub source_type: Option<SourceType>,
}

impl Thread {
    /// Empty thread in the `searching` state, as posted to `POST /thread`.
    pub fn skeleton(
        thread_uid: impl Into<String>,
        owner_uid: impl Into<String>,
        source_type: Option<SourceType>,
    ) -> Self {
        Self {
            thread_uid: thread_uid.into(),
            owner_uid: owner_uid.into(),
            shared_with: vec![],
            messages: vec![],
            sources: vec![],
            status_indicator: StatusIndicator::Searching,
            source_type,
        }
    }

    pub fn push_question(&mut self, query: impl Into<String>) {
        self.messages.push(ChatMessage::Question(query.into()));
    }

    pub fn is_completed(&self) -> bool {
        self.status_indicator == StatusIndicator::Completed
    }

    /// Source type, defaulting to PubMed for threads stored without one.
    pub fn effective_source_type(&self) -> SourceType {
        self.source_type.unwrap_or_default()
    }
}

/// Sidebar entry pointing at a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub thread_uid: String,
    #[serde(default)]
    pub thread_name: String,
    #[serde(default)]
    pub source_type: Option<SourceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub user_uid: String,
    #[serde(default)]
    pub thread_refs: Vec<ThreadRef>,
}
