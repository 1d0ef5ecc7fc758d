//! medsearch-sources: Thread data model and client-side source reconciliation.
//! - Raw per-turn citation records and thread/message types
//! - Identity-based deduplication across turns
//! - Raw → unique index mapping for answer citations
//! - Claim linking and display grouping

pub mod models;
pub mod dedup;
pub mod citations;

pub use dedup::{reconcile, source_identity, SourceReconciliation, UniqueSource};
pub use models::{
    AnswerClaim, ChatMessage, RawSource, SourceType, StatusIndicator, Thread, ThreadRef,
    UserMetadata,
};
