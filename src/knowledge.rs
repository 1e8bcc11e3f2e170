//! Knowledge index: heading-boundary snippet parser and term statistics.
//!
//! The corpus is a directory of Markdown documents. Each document is cut into
//! [`Snippet`]s at second-level headings (`## `), each snippet is tokenized
//! and turned into a max-normalized term-frequency vector, and once every
//! document has been parsed a global inverse-document-frequency table is
//! computed over the whole snippet set:
//!
//! ```text
//! tf(t, s)  = count(t, s) / max_count(s)          ∈ (0, 1]
//! idf(t)    = ln(N / df(t))                       ≥ 0
//! ```
//!
//! A missing or unreadable corpus is not an error; it produces an empty
//! index and retrieval simply returns nothing.
//!
//! [`LazyIndex`] owns the process-wide index. It builds on first use, at most
//! once, and hands out a shared read-only [`Arc`] afterwards.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::models::Snippet;

/// Tokens shorter than this are dropped.
const MIN_TOKEN_CHARS: usize = 3;

/// A named source text, before it is cut into snippets.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub name: String,
    pub text: String,
}

impl CorpusDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Snippet thresholds, decoupled from the rest of the knowledge config.
#[derive(Debug, Clone, Copy)]
pub struct SectionLimits {
    pub min_section_chars: usize,
    pub min_body_chars: usize,
}

impl Default for SectionLimits {
    fn default() -> Self {
        Self {
            min_section_chars: 20,
            min_body_chars: 10,
        }
    }
}

impl From<&KnowledgeConfig> for SectionLimits {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            min_section_chars: config.min_section_chars,
            min_body_chars: config.min_body_chars,
        }
    }
}

/// Lower-case, replace everything but ASCII letters and digits with
/// whitespace, split, and drop tokens under three characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Term counts divided by the count of the most frequent term.
///
/// Ordered map so that downstream float sums are reproducible.
pub fn term_frequencies(tokens: &[String]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(1).max(1) as f64;
    counts
        .into_iter()
        .map(|(term, count)| (term, count as f64 / max))
        .collect()
}

/// `ln(N / df)` for every term that appears in any snippet.
pub fn inverse_document_frequency(snippets: &[Snippet]) -> HashMap<String, f64> {
    let total = snippets.len() as f64;
    let mut df: HashMap<&str, usize> = HashMap::new();

    // Vector keys are already unique per snippet.
    for snippet in snippets {
        for term in snippet.term_vector.keys() {
            *df.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    df.into_iter()
        .map(|(term, count)| (term.to_string(), (total / count as f64).ln()))
        .collect()
}

/// Human-readable source name for a file: stem with dashes as spaces.
pub fn source_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace('-', " "))
        .unwrap_or_default()
}

/// Split a document into snippets on `## ` headings.
///
/// Text before the first `## ` heading forms its own block, headed by its
/// first line. Blocks shorter than `min_section_chars` or with a body shorter
/// than `min_body_chars` are discarded.
pub fn parse_document(doc: &CorpusDocument, limits: SectionLimits) -> Vec<Snippet> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in doc.text.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            sections.push(std::mem::take(&mut current));
            current.push_str(rest);
        } else {
            current.push_str(line);
        }
        current.push('\n');
    }
    sections.push(current);

    let mut snippets = Vec::new();
    for section in &sections {
        let trimmed = section.trim();
        if trimmed.is_empty() || trimmed.chars().count() < limits.min_section_chars {
            continue;
        }

        let (first_line, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
        let heading = first_line.trim_start_matches('#').trim().to_string();
        let body = rest.trim();
        if body.chars().count() < limits.min_body_chars {
            continue;
        }

        let tokens = tokenize(body);
        snippets.push(Snippet {
            content: body.to_string(),
            source_name: doc.name.clone(),
            heading,
            term_vector: term_frequencies(&tokens),
        });
    }

    snippets
}

/// Read every matching file under the knowledge root, sorted by path.
///
/// A root that does not exist yields an empty list. Files that cannot be
/// read as UTF-8 are skipped with a warning.
pub fn scan_corpus(config: &KnowledgeConfig) -> Result<Vec<CorpusDocument>> {
    let root = &config.root;
    if !root.exists() {
        tracing::warn!(root = %root.display(), "knowledge root does not exist; index will be empty");
        return Ok(Vec::new());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut found: Vec<(String, std::path::PathBuf)> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        found.push((rel_str, path.to_path_buf()));
    }

    // Deterministic corpus order, which is also the retrieval tie-break order.
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut docs = Vec::with_capacity(found.len());
    for (rel, path) in found {
        match std::fs::read_to_string(&path) {
            Ok(text) => docs.push(CorpusDocument::new(source_name_for(&path), text)),
            Err(e) => tracing::warn!(file = %rel, error = %e, "skipping unreadable knowledge file"),
        }
    }

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Immutable snippet set plus its IDF table.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    snippets: Vec<Snippet>,
    idf: HashMap<String, f64>,
    documents: Vec<DocumentSummary>,
}

/// Per-document bookkeeping for listings and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub name: String,
    pub snippets: usize,
}

impl KnowledgeIndex {
    /// Build from in-memory documents. Order of `docs` is corpus order.
    pub fn from_documents(docs: &[CorpusDocument], limits: SectionLimits) -> Self {
        let mut snippets = Vec::new();
        let mut documents = Vec::with_capacity(docs.len());

        for doc in docs {
            let parsed = parse_document(doc, limits);
            documents.push(DocumentSummary {
                name: doc.name.clone(),
                snippets: parsed.len(),
            });
            snippets.extend(parsed);
        }

        let idf = inverse_document_frequency(&snippets);
        Self {
            snippets,
            idf,
            documents,
        }
    }

    /// Build from the configured knowledge root. Never fails: any problem
    /// reading the corpus is logged and yields an empty index.
    pub fn load(config: &KnowledgeConfig) -> Self {
        match scan_corpus(config) {
            Ok(docs) => {
                let index = Self::from_documents(&docs, SectionLimits::from(config));
                tracing::info!(
                    documents = index.documents.len(),
                    snippets = index.snippets.len(),
                    terms = index.idf.len(),
                    "knowledge index built"
                );
                index
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read knowledge base; using empty index");
                Self::default()
            }
        }
    }

    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    pub fn idf(&self) -> &HashMap<String, f64> {
        &self.idf
    }

    pub fn documents(&self) -> &[DocumentSummary] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Distinct terms across the corpus.
    pub fn vocabulary(&self) -> HashSet<&str> {
        self.idf.keys().map(String::as_str).collect()
    }
}

type IndexLoader = Box<dyn Fn() -> KnowledgeIndex + Send + Sync>;

/// Lazily built, build-once holder for the shared [`KnowledgeIndex`].
///
/// Concurrent first callers serialize on the build lock; the loser of the
/// race finds the slot filled and reuses the winner's index. Readers never
/// observe a partially built index because the slot is only written with a
/// finished `Arc`.
pub struct LazyIndex {
    loader: IndexLoader,
    slot: RwLock<Option<Arc<KnowledgeIndex>>>,
    build_lock: Mutex<()>,
    builds: AtomicUsize,
}

impl LazyIndex {
    /// Index that loads from the configured knowledge root on first use.
    pub fn new(config: KnowledgeConfig) -> Self {
        Self::with_loader(move || KnowledgeIndex::load(&config))
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> KnowledgeIndex + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: RwLock::new(None),
            build_lock: Mutex::new(()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Already-built index, e.g. for tests.
    pub fn preloaded(index: KnowledgeIndex) -> Self {
        let lazy = Self::with_loader(KnowledgeIndex::default);
        *lazy.slot.write() = Some(Arc::new(index));
        lazy
    }

    /// Return the index, building it if this is the first call.
    pub fn get(&self) -> Arc<KnowledgeIndex> {
        if let Some(index) = self.slot.read().as_ref() {
            return Arc::clone(index);
        }

        let _guard = self.build_lock.lock();
        if let Some(index) = self.slot.read().as_ref() {
            return Arc::clone(index);
        }

        let index = Arc::new((self.loader)());
        self.builds.fetch_add(1, Ordering::SeqCst);
        *self.slot.write() = Some(Arc::clone(&index));
        index
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Drop the built index; the next [`get`](Self::get) rebuilds it.
    /// Holders of the previous `Arc` keep a consistent view.
    pub fn invalidate(&self) {
        let _guard = self.build_lock.lock();
        *self.slot.write() = None;
    }

    /// How many times the loader has run.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    const REFUNDS: &str = "# Refund Policy\n\nIntro line that is long enough to keep around.\n\n## Eligibility\n\nPrint defects and damaged shipments qualify for a reprint or refund.\n\n## Tiny\n\nshort\n\n## How to Request\n\nEmail support with your order number and photos of the defect.\n";

    #[test]
    fn test_tokenize_pipeline() {
        let tokens = tokenize("DTF-transfers: 22\" wide, at 300 DPI! Go");
        assert_eq!(tokens, vec!["dtf", "transfers", "wide", "300", "dpi"]);
    }

    #[test]
    fn test_tokenize_non_ascii_is_separator() {
        assert_eq!(tokenize("café crème"), vec!["caf"]);
    }

    #[test]
    fn test_term_frequencies_max_normalized() {
        let tokens = tokenize("sheet sheet sheet gang gang print");
        let tf = term_frequencies(&tokens);
        assert!((tf["sheet"] - 1.0).abs() < 1e-12);
        assert!((tf["gang"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((tf["print"] - 1.0 / 3.0).abs() < 1e-12);
        assert!(tf.values().all(|w| *w > 0.0 && *w <= 1.0));
    }

    #[test]
    fn test_term_frequencies_empty() {
        assert!(term_frequencies(&[]).is_empty());
    }

    #[test]
    fn test_parse_document_splits_on_level_two_headings() {
        let doc = CorpusDocument::new("refund policy", REFUNDS);
        let snippets = parse_document(&doc, SectionLimits::default());

        let headings: Vec<&str> = snippets.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Refund Policy", "Eligibility", "How to Request"]);
        assert!(snippets.iter().all(|s| s.source_name == "refund policy"));
        assert!(snippets[1].content.starts_with("Print defects"));
        assert!(snippets[1].term_vector.contains_key("reprint"));
    }

    #[test]
    fn test_parse_document_keeps_deeper_headings_inside_block() {
        let doc = CorpusDocument::new(
            "guide",
            "## Files\n\n### PNG\n\nTransparent backgrounds print cleanly on any garment.\n",
        );
        let snippets = parse_document(&doc, SectionLimits::default());
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].heading, "Files");
        assert!(snippets[0].content.contains("### PNG"));
    }

    #[test]
    fn test_parse_document_discards_short_blocks() {
        let doc = CorpusDocument::new("x", "## A\nshort body\n\n## Heading only padded out\n");
        assert!(parse_document(&doc, SectionLimits::default()).is_empty());
    }

    #[test]
    fn test_idf_values() {
        let docs = vec![
            CorpusDocument::new("a", "## Alpha section\n\nshared words plus unique alpha"),
            CorpusDocument::new("b", "## Beta section\n\nshared words plus unique beta"),
        ];
        let index = KnowledgeIndex::from_documents(&docs, SectionLimits::default());
        assert_eq!(index.snippets().len(), 2);

        let idf = index.idf();
        assert!(idf["shared"].abs() < 1e-12);
        assert!((idf["alpha"] - 2f64.ln()).abs() < 1e-12);

        // Every vector term has an IDF entry, and every IDF is non-negative.
        for s in index.snippets() {
            for term in s.term_vector.keys() {
                assert!(idf.contains_key(term));
            }
        }
        assert!(idf.values().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_source_name_for() {
        assert_eq!(
            source_name_for(Path::new("/kb/shipping-and-turnaround.md")),
            "shipping and turnaround"
        );
    }

    #[test]
    fn test_load_missing_root_is_empty() {
        let config = KnowledgeConfig {
            root: "/definitely/not/here".into(),
            ..KnowledgeConfig::default()
        };
        let index = KnowledgeIndex::load(&config);
        assert!(index.is_empty());
        assert!(index.idf().is_empty());
    }

    #[test]
    fn test_load_from_directory_sorted_and_filtered() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("b-doc.md"), "## Second\n\nThe second document body text.").unwrap();
        fs::write(tmp.path().join("a-doc.md"), "## First\n\nThe first document body text.").unwrap();
        fs::write(tmp.path().join("notes.txt"), "## Ignored\n\nNot markdown so not indexed.").unwrap();

        let config = KnowledgeConfig {
            root: tmp.path().to_path_buf(),
            ..KnowledgeConfig::default()
        };
        let index = KnowledgeIndex::load(&config);
        let names: Vec<&str> = index.documents().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a doc", "b doc"]);
        assert_eq!(index.snippets()[0].heading, "First");
    }

    #[test]
    fn test_lazy_index_builds_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Arc::new(LazyIndex::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            KnowledgeIndex::from_documents(
                &[CorpusDocument::new("kb", "## Heading\n\nSome body text for the index.")],
                SectionLimits::default(),
            )
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = lazy.clone();
                thread::spawn(move || lazy.get())
            })
            .collect();
        let indexes: Vec<Arc<KnowledgeIndex>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.build_count(), 1);
        assert!(indexes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(indexes[0].snippets().len(), 1);
    }

    #[test]
    fn test_lazy_index_invalidate_rebuilds() {
        let lazy = LazyIndex::with_loader(KnowledgeIndex::default);
        assert!(!lazy.is_loaded());
        let first = lazy.get();
        let again = lazy.get();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(lazy.build_count(), 1);

        lazy.invalidate();
        assert!(!lazy.is_loaded());
        let rebuilt = lazy.get();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(lazy.build_count(), 2);
    }
}
