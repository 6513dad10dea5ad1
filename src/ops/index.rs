//! Full-text search index and the progressive task that fills it

use super::layout::{page_text, TextLayoutConfig};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::progress::{percent, ProgressiveTask, Step};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Search index shared between indexing tasks and searchers
pub type SharedIndex = Arc<RwLock<SearchIndex>>;

#[derive(Debug, Clone)]
struct IndexedPage {
    page: u32,
    text: String,
    terms: BTreeSet<String>,
}

/// Inverted index from lowercase terms to (document, page) pairs
#[derive(Debug, Default)]
pub struct SearchIndex {
    documents: BTreeMap<String, Vec<IndexedPage>>,
    postings: HashMap<String, BTreeSet<(String, u32)>>,
}

/// Search options
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub max_results: usize,
    /// Characters of context on each side of a match
    pub context_chars: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            max_results: 100,
            context_chars: 50,
        }
    }
}

/// A phrase occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: String,
    /// Page number (1-indexed)
    pub page: u32,
    /// Matched text with context
    pub context: String,
    /// Position in the page text (character offset)
    pub position: usize,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn contains_document(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn page_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Document names in sorted order
    pub fn document_names(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    /// Remove a document and all its postings
    pub fn remove_document(&mut self, name: &str) -> bool {
        let Some(pages) = self.documents.remove(name) else {
            return false;
        };
        for page in pages {
            for term in page.terms {
                if let Some(set) = self.postings.get_mut(&term) {
                    set.remove(&(name.to_string(), page.page));
                    if set.is_empty() {
                        self.postings.remove(&term);
                    }
                }
            }
        }
        true
    }

    fn replace_document(&mut self, name: &str, pages: Vec<IndexedPage>) {
        self.remove_document(name);
        for page in &pages {
            for term in &page.terms {
                self.postings
                    .entry(term.clone())
                    .or_default()
                    .insert((name.to_string(), page.page));
            }
        }
        self.documents.insert(name.to_string(), pages);
    }

    /// Find phrase occurrences. Candidate pages must contain every query term.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let terms = tokenize(query);
        if terms.is_empty() || options.max_results == 0 {
            return Vec::new();
        }

        let mut candidates: Option<BTreeSet<(String, u32)>> = None;
        for term in &terms {
            let Some(set) = self.postings.get(term) else {
                return Vec::new();
            };
            candidates = Some(match candidates {
                None => set.clone(),
                Some(current) => current.intersection(set).cloned().collect(),
            });
        }

        let needle: Vec<char> = query
            .trim()
            .chars()
            .map(|c| fold(c, options.case_sensitive))
            .collect();
        let mut hits = Vec::new();

        for (name, page_num) in candidates.unwrap_or_default() {
            let Some(page) = self
                .documents
                .get(&name)
                .and_then(|pages| pages.iter().find(|p| p.page == page_num))
            else {
                continue;
            };

            let original: Vec<char> = page.text.chars().collect();
            let haystack: Vec<char> = original
                .iter()
                .map(|&c| fold(c, options.case_sensitive))
                .collect();

            let mut start = 0;
            while start + needle.len() <= haystack.len() {
                if haystack[start..start + needle.len()] == needle[..] {
                    let from = start.saturating_sub(options.context_chars);
                    let to = (start + needle.len() + options.context_chars).min(original.len());
                    let context: String = original[from..to]
                        .iter()
                        .map(|&c| if c == '\n' { ' ' } else { c })
                        .collect();
                    hits.push(SearchHit {
                        document: name.clone(),
                        page: page_num,
                        context,
                        position: start,
                    });
                    if hits.len() >= options.max_results {
                        return hits;
                    }
                }
                start += 1;
            }
        }

        hits
    }
}

fn fold(c: char, case_sensitive: bool) -> char {
    if case_sensitive {
        c
    } else {
        c.to_lowercase().next().unwrap_or(c)
    }
}

/// Split text into lowercase alphanumeric terms
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Indexes a document page by page.
///
/// Entries are staged inside the task and committed to the shared index by
/// the final increment, so an abandoned or failed task leaves the index as it
/// was.
pub struct IndexTask {
    index: SharedIndex,
    document: Arc<Document>,
    name: String,
    layout: TextLayoutConfig,
    pages_per_step: usize,
    next: usize,
    staged: Vec<IndexedPage>,
    committed: bool,
}

impl IndexTask {
    pub(crate) fn new(
        index: SharedIndex,
        document: Arc<Document>,
        name: &str,
        pages_per_step: usize,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidOptions {
                reason: "document name must not be empty".to_string(),
            });
        }

        Ok(Self {
            staged: Vec::with_capacity(document.pages.len()),
            index,
            document,
            name: name.to_string(),
            layout: TextLayoutConfig::default(),
            pages_per_step: pages_per_step.max(1),
            next: 0,
            committed: false,
        })
    }

    pub fn document_name(&self) -> &str {
        &self.name
    }

    pub fn pages_indexed(&self) -> usize {
        self.next
    }

    /// Distinct terms staged for this document
    pub fn term_count(&self) -> usize {
        self.staged
            .iter()
            .flat_map(|p| p.terms.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

impl ProgressiveTask for IndexTask {
    fn name(&self) -> &'static str {
        "index"
    }

    fn step(&mut self) -> Result<Step> {
        let total = self.document.pages.len();
        let end = (self.next + self.pages_per_step).min(total);

        while self.next < end {
            let page = &self.document.pages[self.next];
            let text = page_text(page, &self.layout)?;
            let terms = tokenize(&text);
            self.staged.push(IndexedPage {
                page: self.next as u32 + 1,
                text,
                terms,
            });
            self.next += 1;
        }

        if self.next < total {
            return Ok(Step::Pending);
        }

        self.index
            .write()
            .replace_document(&self.name, self.staged.clone());
        self.committed = true;
        tracing::debug!(
            document = %self.name,
            pages = self.staged.len(),
            "committed document to search index"
        );
        Ok(Step::Done)
    }

    fn ratio(&self) -> u8 {
        percent(self.next, self.document.pages.len())
    }

    fn discard(&mut self) {
        self.staged = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;

    fn doc(texts: &[&str]) -> Arc<Document> {
        let pages = texts
            .iter()
            .map(|t| {
                let mut page = Page::new(600.0, 800.0);
                page.push_text(t, 50.0, 700.0, 10.0);
                page
            })
            .collect();
        Arc::new(Document::new(pages))
    }

    fn index_all(index: &SharedIndex, name: &str, texts: &[&str]) {
        let mut task = IndexTask::new(index.clone(), doc(texts), name, 1).unwrap();
        while task.step().unwrap() == Step::Pending {}
    }

    #[test]
    fn test_tokenize() {
        let terms = tokenize("Hello, hello WORLD-wide 42!");
        let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["42", "hello", "wide", "world"]);
    }

    #[test]
    fn test_index_commits_on_final_step() {
        let index = SearchIndex::shared();
        let mut task =
            IndexTask::new(index.clone(), doc(&["alpha beta", "gamma"]), "greek", 1).unwrap();

        assert_eq!(task.step().unwrap(), Step::Pending);
        assert_eq!(index.read().document_count(), 0, "nothing visible mid-task");

        assert_eq!(task.step().unwrap(), Step::Done);
        assert!(task.is_committed());
        let index = index.read();
        assert!(index.contains_document("greek"));
        assert_eq!(index.page_count(), 2);
        assert_eq!(index.term_count(), 3);
    }

    #[test]
    fn test_search_phrase_with_context() {
        let index = SearchIndex::shared();
        index_all(&index, "a.pdf", &["The quick brown fox", "lazy dog"]);
        index_all(&index, "b.pdf", &["A Quick Brown bear"]);

        let options = SearchOptions {
            context_chars: 4,
            ..SearchOptions::default()
        };
        let hits = index.read().search("quick brown", &options);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document, "a.pdf");
        assert_eq!(hits[0].page, 1);
        assert_eq!(hits[0].position, 4);
        assert_eq!(hits[0].context, "The quick brown fox");
        assert_eq!(hits[1].document, "b.pdf");

        let sensitive = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        let hits = index.read().search("Quick", &sensitive);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document, "b.pdf");
    }

    #[test]
    fn test_search_requires_all_terms_and_phrase() {
        let index = SearchIndex::shared();
        index_all(&index, "doc", &["brown quick", "quick brown"]);

        let hits = index.read().search("quick brown", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, 2);

        assert!(index
            .read()
            .search("quick purple", &SearchOptions::default())
            .is_empty());
        assert!(index.read().search("  ", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_search_max_results() {
        let index = SearchIndex::shared();
        index_all(&index, "doc", &["na na na na", "na"]);
        let options = SearchOptions {
            max_results: 3,
            ..SearchOptions::default()
        };
        assert_eq!(index.read().search("na", &options).len(), 3);
    }

    #[test]
    fn test_reindex_replaces_previous_entries() {
        let index = SearchIndex::shared();
        index_all(&index, "doc", &["old words"]);
        index_all(&index, "doc", &["new words"]);

        let index = index.read();
        assert_eq!(index.document_count(), 1);
        assert!(index.search("old", &SearchOptions::default()).is_empty());
        assert_eq!(index.search("new", &SearchOptions::default()).len(), 1);
    }

    #[test]
    fn test_remove_document() {
        let index = SearchIndex::shared();
        index_all(&index, "doc", &["unique term"]);
        assert!(index.write().remove_document("doc"));
        assert!(!index.write().remove_document("doc"));
        assert_eq!(index.read().term_count(), 0);
    }

    #[test]
    fn test_abandoned_task_leaves_index_untouched() {
        let index = SearchIndex::shared();
        let mut task = IndexTask::new(index.clone(), doc(&["one", "two"]), "doc", 1).unwrap();
        assert_eq!(task.step().unwrap(), Step::Pending);
        drop(task);
        assert_eq!(index.read().document_count(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = IndexTask::new(SearchIndex::shared(), doc(&["x"]), "  ", 1);
        assert!(matches!(result, Err(Error::InvalidOptions { .. })));
    }
}
