//! Answer claim linking and display grouping.
//!
//! Claims reference sources by pmid. They are first linked to a 1-based
//! position in the thread's raw source list, then remapped through
//! [`SourceReconciliation`] to the 1-based position in the unique list that
//! the reader actually sees.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dedup::SourceReconciliation;
use crate::models::{AnswerClaim, RawSource};

/// A claim plus the 1-based raw position of the source it cites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedClaim {
    #[serde(flatten)]
    pub claim: AnswerClaim,
    pub linked_index: Option<usize>,
}

/// Consecutive claims that resolve to the same displayed source.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimBlock {
    pub display_index: Option<usize>,
    pub claims: Vec<LinkedClaim>,
}

/// pmid → 1-based raw position. A pmid listed twice keeps its last position.
pub fn source_index_by_pmid(sources: &[RawSource]) -> HashMap<String, usize> {
    sources
        .iter()
        .enumerate()
        .map(|(index, source)| (source.pmid.clone(), index + 1))
        .collect()
}

pub fn link_claims(claims: &[AnswerClaim], sources: &[RawSource]) -> Vec<LinkedClaim> {
    let by_pmid = source_index_by_pmid(sources);
    claims
        .iter()
        .map(|claim| LinkedClaim {
            linked_index: by_pmid.get(&claim.source_id).copied(),
            claim: claim.clone(),
        })
        .collect()
}

/// Global 1-based display index for a per-turn 1-based linked index.
pub fn display_index(linked_index: Option<usize>, reconciliation: &SourceReconciliation) -> Option<usize> {
    match linked_index {
        Some(0) | None => None,
        Some(i) => Some(reconciliation.map_source_index(i - 1) + 1),
    }
}

/// Merge consecutive claims whose mapped display index is equal.
///
/// Equality is checked after remapping, so two different raw citations that
/// resolve to the same paper land in one block.
pub fn group_claims(claims: &[LinkedClaim], reconciliation: &SourceReconciliation) -> Vec<ClaimBlock> {
    let mut blocks: Vec<ClaimBlock> = Vec::new();
    for claim in claims {
        let mapped = display_index(claim.linked_index, reconciliation);
        match blocks.last_mut() {
            Some(block) if block.display_index == mapped => block.claims.push(claim.clone()),
            _ => blocks.push(ClaimBlock { display_index: mapped, claims: vec![claim.clone()] }),
        }
    }
    blocks
}
