//! Deduplication of citation records across query turns.
//!
//! A thread accumulates one batch of raw sources per turn, so the same paper
//! can appear several times. Reconciliation keeps the first occurrence of each
//! paper and records where every raw ordinal landed in the unique list.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::RawSource;

const TITLE_KEY_CHARS: usize = 50;
const JOURNAL_KEY_CHARS: usize = 20;

/// A raw source plus the ordinal at which it first appeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueSource {
    #[serde(flatten)]
    pub source: RawSource,
    pub original_index: usize,
}

/// Identity key deciding whether two records refer to the same paper.
///
/// Stage 1: PMID. Stage 2: DOI. Stage 3: truncated title, journal and date.
pub fn source_identity(source: &RawSource) -> String {
    if !source.pmid.is_empty() {
        return format!("pmid:{}", source.pmid);
    }
    if let Some(doi) = source.doi.as_deref().filter(|d| !d.is_empty()) {
        return format!("doi:{}", doi);
    }
    format!(
        "title:{}|journal:{}|date:{}",
        prefix_chars(&source.title, TITLE_KEY_CHARS),
        prefix_chars(&source.journal, JOURNAL_KEY_CHARS),
        source.publication_date,
    )
}

fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Deduplicated sources and the raw → unique index table for one raw list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReconciliation {
    unique: Vec<UniqueSource>,
    /// `mapping[raw_ordinal]` is the position of that source in `unique`.
    mapping: Vec<usize>,
}

/// Reconcile the turn-concatenated raw source list in a single left-to-right scan.
pub fn reconcile(raw_sources: &[RawSource]) -> SourceReconciliation {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(raw_sources.len());
    let mut unique = Vec::new();
    let mut mapping = Vec::with_capacity(raw_sources.len());

    for (index, source) in raw_sources.iter().enumerate() {
        let identity = source_identity(source);
        let position = *positions.entry(identity).or_insert_with(|| {
            unique.push(UniqueSource { source: source.clone(), original_index: index });
            unique.len() - 1
        });
        mapping.push(position);
    }

    tracing::debug!(
        raw = raw_sources.len(),
        unique = unique.len(),
        "Reconciled thread sources"
    );

    SourceReconciliation { unique, mapping }
}

impl SourceReconciliation {
    pub fn unique_sources(&self) -> &[UniqueSource] {
        &self.unique
    }

    pub fn into_unique_sources(self) -> Vec<UniqueSource> {
        self.unique
    }

    pub fn total_raw_sources(&self) -> usize {
        self.mapping.len()
    }

    pub fn total_unique_sources(&self) -> usize {
        self.unique.len()
    }

    /// Position of raw ordinal `raw_index` in the unique list, if it exists.
    pub fn try_map_source_index(&self, raw_index: usize) -> Option<usize> {
        self.mapping.get(raw_index).copied()
    }

    /// Position of raw ordinal `raw_index` in the unique list.
    ///
    /// Ordinals outside the raw list come back unchanged. Callers must treat
    /// the result as best-effort: a stale ordinal may point at the wrong paper.
    pub fn map_source_index(&self, raw_index: usize) -> usize {
        self.try_map_source_index(raw_index).unwrap_or(raw_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pmid(id: &str) -> RawSource {
        RawSource { pmid: id.to_string(), title: format!("Paper {id}"), ..Default::default() }
    }

    fn untagged(title: &str, journal: &str, date: &str) -> RawSource {
        RawSource {
            title: title.to_string(),
            journal: journal.to_string(),
            publication_date: date.to_string(),
            ..Default::default()
        }
    }

    /// Deterministic pseudo-random raw lists with heavy identity overlap.
    fn generated_lists() -> Vec<Vec<RawSource>> {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        (0..40)
            .map(|_| {
                let len = (next() % 25) as usize;
                (0..len)
                    .map(|_| match next() % 3 {
                        0 => pmid(&(next() % 6).to_string()),
                        1 => RawSource {
                            doi: Some(format!("10.1/{}", next() % 4)),
                            ..Default::default()
                        },
                        _ => untagged(&format!("T{}", next() % 3), "J", "2020"),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_identity_prefers_pmid_then_doi() {
        let mut s = pmid("123");
        s.doi = Some("10.1000/x".to_string());
        assert_eq!(source_identity(&s), "pmid:123");

        s.pmid.clear();
        assert_eq!(source_identity(&s), "doi:10.1000/x");
    }

    #[test]
    fn test_identity_falls_back_to_truncated_content() {
        let title = "A".repeat(80);
        let journal = "Journal of Clinical Oncology Reports";
        let s = untagged(&title, journal, "2021-05");
        assert_eq!(
            source_identity(&s),
            format!("title:{}|journal:{}|date:2021-05", "A".repeat(50), &journal[..20])
        );
    }

    #[test]
    fn test_identity_truncation_respects_char_boundaries() {
        let title = "β".repeat(60);
        let s = untagged(&title, "Ärzteblatt", "2019");
        assert_eq!(
            source_identity(&s),
            format!("title:{}|journal:Ärzteblatt|date:2019", "β".repeat(50))
        );
    }

    #[test]
    fn test_empty_doi_is_not_an_identity() {
        let s = RawSource { doi: Some(String::new()), ..untagged("T", "J", "D") };
        assert_eq!(source_identity(&s), "title:T|journal:J|date:D");
    }

    #[test]
    fn test_dedup_across_turns() {
        // turn 1: [1, 2]; turn 2: [2, 3]
        let raw = vec![pmid("1"), pmid("2"), pmid("2"), pmid("3")];
        let rec = reconcile(&raw);

        let ids: Vec<&str> = rec.unique_sources().iter().map(|u| u.source.pmid.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(rec.total_raw_sources(), 4);
        assert_eq!(rec.total_unique_sources(), 3);
        assert_eq!(rec.map_source_index(0), 0);
        assert_eq!(rec.map_source_index(1), 1);
        assert_eq!(rec.map_source_index(2), 1);
        assert_eq!(rec.map_source_index(3), 2);
    }

    #[test]
    fn test_same_pmid_wins_over_differing_doi_and_title() {
        let a = RawSource { doi: Some("10.1/a".into()), ..pmid("42") };
        let b = RawSource { doi: Some("10.1/b".into()), title: "Other".into(), ..pmid("42") };
        let rec = reconcile(&[a.clone(), b]);
        assert_eq!(rec.total_unique_sources(), 1);
        assert_eq!(rec.unique_sources()[0].source, a);
        assert_eq!(rec.map_source_index(1), 0);
    }

    #[test]
    fn test_out_of_range_ordinal_falls_back_to_itself() {
        let rec = reconcile(&[pmid("1"), pmid("1")]);
        assert_eq!(rec.try_map_source_index(7), None);
        assert_eq!(rec.map_source_index(7), 7);
    }

    #[test]
    fn test_empty_input() {
        let rec = reconcile(&[]);
        assert_eq!(rec.total_unique_sources(), 0);
        assert_eq!(rec.map_source_index(0), 0);
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        for raw in generated_lists() {
            assert_eq!(reconcile(&raw), reconcile(&raw));
        }
    }

    #[test]
    fn test_original_index_strictly_increasing() {
        for raw in generated_lists() {
            let rec = reconcile(&raw);
            for pair in rec.unique_sources().windows(2) {
                assert!(pair[0].original_index < pair[1].original_index);
            }
        }
    }

    #[test]
    fn test_mapping_is_total_and_consistent() {
        for raw in generated_lists() {
            let rec = reconcile(&raw);
            for k in 0..raw.len() {
                let u = rec.map_source_index(k);
                assert!(u < rec.total_unique_sources());
                assert_eq!(
                    source_identity(&rec.unique_sources()[u].source),
                    source_identity(&raw[k])
                );
            }
        }
    }

    #[test]
    fn test_unique_list_has_one_entry_per_identity() {
        for raw in generated_lists() {
            let rec = reconcile(&raw);
            let mut seen = std::collections::HashSet::new();
            for u in rec.unique_sources() {
                assert!(seen.insert(source_identity(&u.source)));
                assert_eq!(raw[u.original_index], u.source);
            }
        }
    }
}
