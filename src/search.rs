//! TF-IDF cosine retriever over the [`KnowledgeIndex`].
//!
//! # Scoring
//!
//! 1. Tokenize the query with the indexing pipeline and compute its
//!    max-normalized term frequencies (no IDF yet).
//! 2. For every snippet, weight each term of the query ∪ snippet vocabulary
//!    as `tf × idf(term)`; terms unknown to the corpus weigh 0.
//! 3. Score = cosine of the two weighted vectors, 0 when either magnitude
//!    is 0.
//! 4. Stable sort by score (desc), so equal scores keep corpus order.
//! 5. Keep scores strictly above `min_score`, then truncate to `top_k`.
//!
//! Retrieval is a pure function of `(index, query, params)`.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::knowledge::{term_frequencies, tokenize, KnowledgeIndex};
use crate::models::RetrievedSnippet;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_score: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: 0.05,
        }
    }
}

impl From<&Config> for RetrievalParams {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.knowledge.top_k,
            min_score: config.knowledge.min_score,
        }
    }
}

/// Cosine similarity of two term-frequency vectors in IDF-weighted space.
///
/// ```text
///            Σ (q_t·idf_t)(s_t·idf_t)
/// cos = ─────────────────────────────────
///        ‖q ⊙ idf‖ × ‖s ⊙ idf‖
/// ```
pub fn cosine_similarity(
    query: &BTreeMap<String, f64>,
    snippet: &BTreeMap<String, f64>,
    idf: &HashMap<String, f64>,
) -> f64 {
    let mut dot = 0.0;
    let mut query_mag = 0.0;
    let mut snippet_mag = 0.0;

    let weight = |term: &str| idf.get(term).copied().unwrap_or(0.0);

    for (term, q) in query {
        let w = weight(term);
        let qv = q * w;
        let sv = snippet.get(term).copied().unwrap_or(0.0) * w;
        dot += qv * sv;
        query_mag += qv * qv;
    }
    for (term, s) in snippet {
        let sv = s * weight(term);
        snippet_mag += sv * sv;
    }

    let magnitude = query_mag.sqrt() * snippet_mag.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot / magnitude
}

/// Score every snippet against `query`, in corpus order.
pub fn score_snippets(index: &KnowledgeIndex, query: &str) -> Vec<f64> {
    let query_tf = term_frequencies(&tokenize(query));
    index
        .snippets()
        .iter()
        .map(|s| cosine_similarity(&query_tf, &s.term_vector, index.idf()))
        .collect()
}

/// Return up to `top_k` snippets scoring above `min_score`, best first.
pub fn retrieve(index: &KnowledgeIndex, query: &str, params: RetrievalParams) -> Vec<RetrievedSnippet> {
    if index.is_empty() || query.trim().is_empty() {
        return Vec::new();
    }

    let scores = score_snippets(index, query);
    let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();

    // `sort_by` is stable: equal scores keep corpus order.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked
        .into_iter()
        .filter(|(_, score)| *score > params.min_score)
        .take(params.top_k)
        .map(|(i, score)| {
            let s = &index.snippets()[i];
            RetrievedSnippet {
                content: s.content.clone(),
                source_name: s.source_name.clone(),
                heading: s.heading.clone(),
                score,
            }
        })
        .collect()
}

/// `rep search`: print ranked snippets for a query.
pub fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let index = KnowledgeIndex::load(&config.knowledge);
    let mut params = RetrievalParams::from(config);
    if let Some(limit) = limit {
        params.top_k = limit;
    }

    let results = retrieve(&index, query, params);
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}",
            i + 1,
            result.score,
            result.source_name,
            result.heading
        );
        let excerpt: String = result.content.replace('\n', " ").chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{CorpusDocument, SectionLimits};
    use std::sync::Arc;
    use std::thread;

    fn corpus() -> KnowledgeIndex {
        let docs = vec![
            CorpusDocument::new(
                "gang sheets",
                "## Sizes\n\nGang sheets are 22 inches wide. Gang sheet lengths run from 12 to 48 inches.\n\n## Builder\n\nThe builder canvas lets you arrange designs and resize them before checkout.",
            ),
            CorpusDocument::new(
                "refund policy",
                "## Eligibility\n\nPrint defects and shipping damage qualify for a refund or a reprint.\n\n## Requests\n\nEmail support within seven days with photos and the order number.",
            ),
            CorpusDocument::new(
                "shipping",
                "## Timeline\n\nStandard production takes two to three business days before shipping.",
            ),
        ];
        KnowledgeIndex::from_documents(&docs, SectionLimits::default())
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let index = corpus();
        let s = &index.snippets()[0].term_vector;
        let sim = cosine_similarity(s, s, index.idf());
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_zero_magnitude() {
        let idf: HashMap<String, f64> = HashMap::new();
        let mut a = BTreeMap::new();
        a.insert("gang".to_string(), 1.0);
        assert_eq!(cosine_similarity(&a, &a, &idf), 0.0);
        assert_eq!(cosine_similarity(&BTreeMap::new(), &a, &idf), 0.0);
    }

    #[test]
    fn test_retrieve_ranks_relevant_first() {
        let index = corpus();
        let results = retrieve(&index, "how big are gang sheets?", RetrievalParams::default());
        assert!(!results.is_empty());
        assert_eq!(results[0].source_name, "gang sheets");
        assert_eq!(results[0].heading, "Sizes");
    }

    #[test]
    fn test_results_sorted_and_above_floor() {
        let index = corpus();
        let params = RetrievalParams::default();
        for query in ["refund for damaged print", "shipping days", "arrange designs on canvas"] {
            let results = retrieve(&index, query, params);
            assert!(results.len() <= params.top_k);
            for pair in results.windows(2) {
                assert!(pair[0].score >= pair[1].score, "not sorted for {}", query);
            }
            assert!(results.iter().all(|r| r.score > params.min_score));
        }
    }

    #[test]
    fn test_zero_overlap_returns_empty() {
        let index = corpus();
        assert!(retrieve(&index, "xylophone zebra quantum", RetrievalParams::default()).is_empty());
        assert!(retrieve(&index, "", RetrievalParams::default()).is_empty());
        assert!(retrieve(&index, "a b c", RetrievalParams::default()).is_empty());
    }

    #[test]
    fn test_top_k_truncates() {
        let index = corpus();
        let params = RetrievalParams {
            top_k: 1,
            min_score: 0.0,
        };
        assert_eq!(retrieve(&index, "shipping refund gang builder", params).len(), 1);
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        let docs = vec![
            CorpusDocument::new("first", "## Twin\n\nidentical twin body about vinyl"),
            CorpusDocument::new("second", "## Twin\n\nidentical twin body about vinyl"),
            CorpusDocument::new("third", "## Other\n\nunrelated paragraph concerning mugs"),
        ];
        let index = KnowledgeIndex::from_documents(&docs, SectionLimits::default());
        let results = retrieve(&index, "vinyl", RetrievalParams::default());
        let names: Vec<&str> = results.iter().map(|r| r.source_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(results[0].score, results[1].score);
    }

    #[test]
    fn test_empty_index() {
        let index = KnowledgeIndex::default();
        assert!(retrieve(&index, "gang sheet", RetrievalParams::default()).is_empty());
    }

    #[test]
    fn test_retrieve_is_deterministic_across_threads() {
        let index = Arc::new(corpus());
        let expected = retrieve(&index, "refund shipping damage", RetrievalParams::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| retrieve(&index, "refund shipping damage", RetrievalParams::default()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for h in handles {
            for run in h.join().unwrap() {
                assert_eq!(run, expected);
            }
        }
    }
}
