//! Plain-text rendering of threads, sources and library listings.

use std::fmt::Write;

use medsearch_api::library::{FolderInfo, StoredSource};
use medsearch_api::paper_chat::{ChatRole, PaperChatMessage};
use medsearch_session::DisplayMessage;
use medsearch_sources::citations::ClaimBlock;
use medsearch_sources::{SourceReconciliation, ThreadRef};

pub fn messages(messages: &[DisplayMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        match message {
            DisplayMessage::Question(text) => {
                let _ = writeln!(out, "> {text}\n");
            }
            DisplayMessage::Answer(blocks) => {
                for block in blocks {
                    out.push_str(&claim_block(block));
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Claims of one block as a paragraph, followed by the source marker.
pub fn claim_block(block: &ClaimBlock) -> String {
    let text = block
        .claims
        .iter()
        .map(|c| c.claim.claim.trim())
        .collect::<Vec<_>>()
        .join(" ");
    match block.display_index {
        Some(index) => format!("{text} [{index}]\n"),
        None => format!("{text}\n"),
    }
}

pub fn sources(reconciliation: &SourceReconciliation) -> String {
    let unique = reconciliation.unique_sources();
    if unique.is_empty() {
        return String::new();
    }

    let mut out = format!(
        "Sources ({} unique of {} cited)\n",
        reconciliation.total_unique_sources(),
        reconciliation.total_raw_sources()
    );
    for (position, entry) in unique.iter().enumerate() {
        let source = &entry.source;
        let _ = write!(out, "[{}] {}", position + 1, source.title);
        if !source.journal.is_empty() {
            let _ = write!(out, ". {}", source.journal);
        }
        if !source.publication_date.is_empty() {
            let _ = write!(out, " ({})", source.publication_date);
        }
        if !source.pmid.is_empty() {
            let _ = write!(out, " PMID {}", source.pmid);
        }
        if let Some(doi) = source.doi.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " doi:{doi}");
        }
        out.push('\n');
    }
    out
}

pub fn thread_refs(refs: &[ThreadRef]) -> String {
    if refs.is_empty() {
        return "No threads yet.\n".to_string();
    }
    refs.iter()
        .map(|r| {
            let source_type = r.source_type.unwrap_or_default();
            format!("{}  [{}]  {}\n", r.thread_uid, source_type, r.thread_name)
        })
        .collect()
}

pub fn library(sources: &[StoredSource]) -> String {
    if sources.is_empty() {
        return "Library is empty.\n".to_string();
    }
    sources
        .iter()
        .map(|s| {
            format!(
                "{}  {}  {}\n",
                s.source_id.as_deref().unwrap_or("-"),
                s.path.as_deref().unwrap_or("/"),
                s.display_title()
            )
        })
        .collect()
}

pub fn folders(folders: &[FolderInfo]) -> String {
    folders
        .iter()
        .map(|f| match f.display_name.as_deref() {
            Some(name) if !name.is_empty() => format!("{}  ({name})\n", f.folder_path),
            _ => format!("{}\n", f.folder_path),
        })
        .collect()
}

pub fn chat_history(history: &[PaperChatMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("you: {}\n", m.content),
            ChatRole::Agent => format!("agent: {}\n", m.content),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use medsearch_sources::citations::LinkedClaim;
    use medsearch_sources::{reconcile, AnswerClaim, RawSource};

    fn linked(text: &str) -> LinkedClaim {
        LinkedClaim {
            claim: AnswerClaim { claim: text.into(), ..Default::default() },
            linked_index: Some(1),
        }
    }

    #[test]
    fn test_claim_block_joins_claims_and_marks_source() {
        let block = ClaimBlock { display_index: Some(2), claims: vec![linked("First."), linked(" Second. ")] };
        assert_eq!(claim_block(&block), "First. Second. [2]\n");

        let uncited = ClaimBlock { display_index: None, claims: vec![linked("Background.")] };
        assert_eq!(claim_block(&uncited), "Background.\n");
    }

    #[test]
    fn test_sources_lists_unique_entries_only() {
        let paper = RawSource {
            pmid: "123".into(),
            title: "KRAS G12C inhibitors".into(),
            journal: "Nature".into(),
            publication_date: "2023".into(),
            ..Default::default()
        };
        let other = RawSource { pmid: "456".into(), title: "EGFR".into(), ..Default::default() };
        let reconciliation = reconcile(&[paper.clone(), other, paper]);

        let text = sources(&reconciliation);
        assert!(text.starts_with("Sources (2 unique of 3 cited)\n"));
        assert!(text.contains("[1] KRAS G12C inhibitors. Nature (2023) PMID 123\n"));
        assert!(text.contains("[2] EGFR PMID 456\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_empty_listings() {
        assert_eq!(sources(&reconcile(&[])), "");
        assert_eq!(thread_refs(&[]), "No threads yet.\n");
        assert_eq!(library(&[]), "Library is empty.\n");
    }

    #[test]
    fn test_library_prefers_user_title() {
        let source = StoredSource {
            source_id: Some("src_1".into()),
            title: "Original".into(),
            user_paper_title: Some("My notes".into()),
            path: Some("/kras/".into()),
            ..Default::default()
        };
        assert_eq!(library(&[source]), "src_1  /kras/  My notes\n");
    }
}
