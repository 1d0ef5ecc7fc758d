//! Search within the user's saved papers.
//!
//! Case-insensitive substring hits on the descriptive fields come first, in
//! library order. Fuzzy hits follow, ranked by a weighted sum of per-field
//! `nucleo` scores. The query accepts nucleo's pattern syntax (`^prefix`,
//! `suffix$`, `'exact`, `!negation`).

use nucleo::pattern::{CaseMatching, Normalization, Pattern};
use nucleo::{Config, Matcher, Utf32Str};

use crate::library::StoredSource;

/// Queries shorter than this only use substring matching.
pub const MIN_FUZZY_QUERY_CHARS: usize = 2;

/// nucleo awards 16 points per matched character before bonuses and gap
/// penalties. A field hit must reach three quarters of that per query char.
const SCORE_PER_CHAR: u32 = 16;
const MIN_SCORE_RATIO: (u32, u32) = (3, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Authors,
    Journal,
    Abstract,
    Keywords,
    Tags,
    Doi,
    Pmid,
    Country,
}

impl Field {
    const ALL: [Field; 9] = [
        Field::Title,
        Field::Authors,
        Field::Journal,
        Field::Abstract,
        Field::Keywords,
        Field::Tags,
        Field::Doi,
        Field::Pmid,
        Field::Country,
    ];

    fn weight(self) -> f64 {
        match self {
            Field::Title => 2.0,
            Field::Authors => 1.5,
            Field::Keywords | Field::Tags => 1.2,
            Field::Journal | Field::Country => 1.0,
            Field::Abstract => 0.8,
            Field::Doi | Field::Pmid => 0.5,
        }
    }

    fn values(self, source: &StoredSource) -> Vec<&str> {
        fn opt(value: &Option<String>) -> Vec<&str> {
            value.as_deref().into_iter().collect()
        }
        fn list(values: &Option<Vec<String>>) -> Vec<&str> {
            values.iter().flatten().map(String::as_str).collect()
        }
        match self {
            Field::Title => {
                let mut titles = vec![source.title.as_str()];
                titles.extend(source.user_paper_title.as_deref());
                titles
            }
            Field::Authors => source.authors.iter().map(String::as_str).collect(),
            Field::Journal => vec![source.journal.as_str()],
            Field::Abstract => opt(&source.abstract_text),
            Field::Keywords => list(&source.keywords),
            Field::Tags => list(&source.tags),
            Field::Doi => opt(&source.doi),
            Field::Pmid => opt(&source.pmid),
            Field::Country => opt(&source.country),
        }
    }

    /// Fields checked by the plain substring pass.
    fn is_direct(self) -> bool {
        matches!(
            self,
            Field::Title | Field::Authors | Field::Journal | Field::Abstract | Field::Keywords | Field::Country
        )
    }
}

/// Filter and rank `sources` for `query`. A blank query returns everything.
pub fn search_library(sources: &[StoredSource], query: &str) -> Vec<StoredSource> {
    let query = query.trim();
    if query.is_empty() {
        return sources.to_vec();
    }

    let needle = query.to_lowercase();
    let mut hits: Vec<usize> = (0..sources.len())
        .filter(|&i| direct_match(&sources[i], &needle))
        .collect();

    let needle_chars = query
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '^' | '$' | '\'' | '!'))
        .count();
    if needle_chars >= MIN_FUZZY_QUERY_CHARS {
        let min_score = needle_chars as u32 * SCORE_PER_CHAR * MIN_SCORE_RATIO.0 / MIN_SCORE_RATIO.1;
        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let mut matcher = Matcher::new(Config::DEFAULT);
        let mut buf = Vec::new();

        let mut ranked: Vec<(usize, f64)> = sources
            .iter()
            .enumerate()
            .filter(|(i, _)| !hits.contains(i))
            .filter_map(|(i, source)| {
                let score = weighted_score(source, &pattern, &mut matcher, &mut buf, min_score);
                (score > 0.0).then_some((i, score))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.extend(ranked.into_iter().map(|(i, _)| i));
    }

    let mut results: Vec<StoredSource> = Vec::with_capacity(hits.len());
    for i in hits {
        let source = &sources[i];
        let duplicate = source.source_id.is_some()
            && results.iter().any(|kept| kept.source_id == source.source_id);
        if !duplicate {
            results.push(source.clone());
        }
    }
    results
}

fn direct_match(source: &StoredSource, needle: &str) -> bool {
    Field::ALL
        .iter()
        .filter(|field| field.is_direct())
        .any(|field| field.values(source).iter().any(|v| v.to_lowercase().contains(needle)))
}

fn weighted_score(
    source: &StoredSource,
    pattern: &Pattern,
    matcher: &mut Matcher,
    buf: &mut Vec<char>,
    min_score: u32,
) -> f64 {
    Field::ALL
        .iter()
        .filter_map(|&field| {
            let best = field
                .values(source)
                .into_iter()
                .filter_map(|value| pattern.score(Utf32Str::new(value, buf), matcher))
                .max()?;
            (best >= min_score).then(|| f64::from(best) * field.weight())
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, title: &str) -> StoredSource {
        StoredSource {
            source_id: Some(id.to_string()),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn ids(results: &[StoredSource]) -> Vec<&str> {
        results.iter().filter_map(|s| s.source_id.as_deref()).collect()
    }

    #[test]
    fn test_blank_query_returns_library_unchanged() {
        let library = vec![paper("src_1", "Renal outcomes"), paper("src_2", "Lung nodules")];
        assert_eq!(ids(&search_library(&library, "   ")), vec!["src_1", "src_2"]);
    }

    #[test]
    fn test_substring_matches_any_descriptive_field() {
        let mut by_author = paper("src_1", "Renal outcomes");
        by_author.authors = vec!["Okafor N".into()];
        let mut by_country = paper("src_2", "Lung nodules");
        by_country.country = Some("Norway".into());
        let library = vec![by_author, by_country, paper("src_3", "Hip fractures")];

        assert_eq!(ids(&search_library(&library, "okafor")), vec!["src_1"]);
        assert_eq!(ids(&search_library(&library, "NORWAY")), vec!["src_2"]);
    }

    #[test]
    fn test_typo_is_found_by_fuzzy_pass() {
        let library = vec![paper("src_1", "Renal outcomes"), paper("src_2", "Advances in cardiology")];
        assert_eq!(ids(&search_library(&library, "crdiology")), vec!["src_2"]);
    }

    #[test]
    fn test_direct_hits_come_before_fuzzy_hits() {
        let library = vec![
            paper("src_1", "Advances in cardiology"),
            paper("src_2", "Cardiology outcomes"),
        ];
        // Only src_2 contains the exact text; src_1 still matches fuzzily.
        let results = search_library(&library, "cardiology o");
        assert_eq!(ids(&results), vec!["src_2", "src_1"]);
    }

    #[test]
    fn test_single_character_query_uses_substring_match() {
        let library = vec![paper("src_1", "Sepsis in the ICU"), paper("src_2", "Lung nodules")];
        assert_eq!(ids(&search_library(&library, "p")), vec!["src_1"]);
        assert!(search_library(&library, "x").is_empty());
    }

    #[test]
    fn test_identifiers_are_searchable() {
        let mut with_pmid = paper("src_1", "Renal outcomes");
        with_pmid.pmid = Some("38712345".into());
        let library = vec![with_pmid, paper("src_2", "Lung nodules")];
        assert_eq!(ids(&search_library(&library, "38712345")), vec!["src_1"]);
    }

    #[test]
    fn test_results_have_no_duplicate_ids() {
        let library = vec![paper("src_1", "Cardiology"), paper("src_1", "Cardiology")];
        assert_eq!(search_library(&library, "cardiology").len(), 1);
    }
}
