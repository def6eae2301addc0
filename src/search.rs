//! Regex search over cached document text with highlighted previews.
//!
//! A query runs in three phases:
//!
//! 1. **Compile** the pattern once. A malformed pattern fails the whole
//!    query before any library, cache or disk work happens.
//! 2. **Refresh** the cache for the working set (see [`CacheStore`]).
//! 3. **Scan** each document's normalized text on the worker pool, keeping
//!    up to `preview_limit` previews per document in match order.
//!
//! Documents without previews are dropped. Per-document failures (missing
//! attachment, extraction errors, vanished cache entries) are logged and
//! only remove that document from the results.
//!
//! # Previews
//!
//! Each preview is the match wrapped in [`MARK_OPEN`]/[`MARK_CLOSE`] with up
//! to `half_preview_length` characters of context on each side, clamped at
//! the ends of the text. A context edge that would split a word is pushed
//! outward to the word boundary, by at most another `half_preview_length`
//! characters:
//!
//! ```text
//! "the quick brown fox jumps over the lazy dog", "fox", half = 5
//!   -> "brown <mark>fox</mark> jumps"
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::SearchSettings;
use crate::error::{CacheError, SearchError};
use crate::extract::TextExtractor;
use crate::library::{Grouping, Library};
use crate::models::{Document, SearchResult};
use crate::pool;

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

/// Flattens extracted text into a single line for matching.
///
/// A hyphen directly followed by a line break is a word wrapped across lines:
/// both are removed so the halves join. Remaining line breaks become spaces
/// and every whitespace run collapses to one space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c == '-' {
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    continue;
                }
                Some('\r') => {
                    chars.next();
                    chars.next_if_eq(&'\n');
                    continue;
                }
                _ => {}
            }
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    if pending_space {
        out.push(' ');
    }
    out
}

/// Compiles a user pattern as a regular expression.
pub fn compile_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex, SearchError> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()?)
}

/// Highlighted previews for the first `limit` non-empty matches in `text`.
pub fn collect_previews(text: &str, regex: &Regex, half: usize, limit: usize) -> Vec<String> {
    regex
        .find_iter(text)
        .filter(|m| !m.is_empty())
        .take(limit)
        .map(|m| {
            let begin = widen_back(text, step_back(text, m.start(), half), half);
            let end = widen_forward(text, step_forward(text, m.end(), half), half);
            let mut preview = String::with_capacity(
                end - begin + MARK_OPEN.len() + MARK_CLOSE.len(),
            );
            preview.push_str(&text[begin..m.start()]);
            preview.push_str(MARK_OPEN);
            preview.push_str(m.as_str());
            preview.push_str(MARK_CLOSE);
            preview.push_str(&text[m.end()..end]);
            preview
        })
        .collect()
}

/// Byte offset `n` characters before `pos`, clamped to the start.
fn step_back(text: &str, pos: usize, n: usize) -> usize {
    text[..pos]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(pos, |(i, _)| i)
}

/// Byte offset `n` characters after `pos`, clamped to the end.
fn step_forward(text: &str, pos: usize, n: usize) -> usize {
    text[pos..]
        .char_indices()
        .take(n)
        .last()
        .map_or(pos, |(i, c)| pos + i + c.len_utf8())
}

/// Moves `begin` left to the start of the word it cuts, if any.
fn widen_back(text: &str, mut begin: usize, max: usize) -> usize {
    let cuts_word = text[begin..]
        .chars()
        .next()
        .is_some_and(|c| !c.is_whitespace());
    if !cuts_word {
        return begin;
    }
    for (i, c) in text[..begin].char_indices().rev().take(max) {
        if c.is_whitespace() {
            break;
        }
        begin = i;
    }
    begin
}

/// Moves `end` right to the end of the word it cuts, if any.
fn widen_forward(text: &str, mut end: usize, max: usize) -> usize {
    let cuts_word = text[..end]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if !cuts_word {
        return end;
    }
    for c in text[end..].chars().take(max) {
        if c.is_whitespace() {
            break;
        }
        end += c.len_utf8();
    }
    end
}

/// Cached text for one document, rebuilding once if the entry has vanished.
fn load_text(cache: &CacheStore, doc: &Document) -> Result<String, CacheError> {
    match cache.read(&doc.key) {
        Ok(entry) => Ok(entry.text),
        Err(CacheError::Miss(_)) => {
            debug!("Cache entry for {} vanished; rebuilding once", doc.key);
            cache.rebuild(doc)?;
            cache.read(&doc.key).map(|entry| entry.text)
        }
        Err(e) => Err(e),
    }
}

/// Runs queries against a working set, backed by a [`CacheStore`].
#[derive(Clone)]
pub struct SearchEngine {
    cache: CacheStore,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(settings: SearchSettings, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            cache: CacheStore::new(&settings, extractor),
            settings,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Searches `documents` for `pattern`.
    ///
    /// Results keep the working-set order. An empty pattern returns no
    /// results without touching the cache.
    pub async fn search(
        &self,
        documents: Vec<Document>,
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let regex = compile_pattern(pattern, case_insensitive)?;
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.run(documents, regex).await)
    }

    /// Resolves `groupings` through `library`, then searches the working set.
    ///
    /// The pattern is validated before the library is contacted.
    pub async fn search_library(
        &self,
        library: &Library,
        groupings: &[Grouping],
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let regex = compile_pattern(pattern, case_insensitive)?;
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let documents = library.documents(groupings).await?;
        Ok(self.run(documents, regex).await)
    }

    async fn run(&self, documents: Vec<Document>, regex: Regex) -> Vec<SearchResult> {
        let total = documents.len();
        let report = self.cache.ensure_fresh(&documents).await;
        let failed: HashSet<String> = report.failed_keys().map(str::to_string).collect();

        let candidates: Vec<Document> = documents
            .into_iter()
            .filter(|doc| doc.source_path.is_some() && !failed.contains(&doc.key))
            .collect();
        let scanned = candidates.len();

        let cache = self.cache.clone();
        let half = self.settings.half_preview_length;
        let limit = self.settings.preview_limit;

        let outcomes = pool::map_blocking(candidates, self.settings.concurrency, move |doc| {
            let text = match load_text(&cache, &doc) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping {}: {}", doc.key, e);
                    return None;
                }
            };
            let previews = collect_previews(&normalize(&text), &regex, half, limit);
            if previews.is_empty() {
                return None;
            }
            Some(SearchResult {
                document: doc,
                previews,
            })
        })
        .await;

        let results: Vec<SearchResult> = outcomes.into_iter().flatten().flatten().collect();
        info!(
            "Search matched {} of {} documents ({} scanned)",
            results.len(),
            total,
            scanned
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn previews(text: &str, pattern: &str, half: usize, limit: usize) -> Vec<String> {
        let regex = compile_pattern(pattern, true).unwrap();
        collect_previews(text, &regex, half, limit)
    }

    // ============ normalize ============

    #[test]
    fn dehyphenates_wrapped_words() {
        assert_eq!(normalize("inter-\nnational"), "international");
        assert_eq!(normalize("inter-\r\nnational"), "international");
    }

    #[test]
    fn plain_line_breaks_become_spaces() {
        assert_eq!(normalize("end.\nNext"), "end. Next");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize("a  \t b\n\n\nc"), "a b c");
        assert_eq!(normalize("page one\n\nnote one\n"), "page one note one ");
    }

    #[test]
    fn hyphen_without_line_break_is_kept() {
        assert_eq!(normalize("well-known - fact"), "well-known - fact");
        assert_eq!(normalize("dash -\nnext"), "dash next");
    }

    // ============ previews ============

    #[test]
    fn end_to_end_example() {
        assert_eq!(
            previews("the quick brown fox jumps over the lazy dog", "fox", 5, 10),
            vec!["brown <mark>fox</mark> jumps"]
        );
    }

    #[test]
    fn context_clamps_at_text_edges() {
        assert_eq!(
            previews("fox at start", "fox", 20, 10),
            vec!["<mark>fox</mark> at start"]
        );
        assert_eq!(
            previews("ends with fox", "fox", 20, 10),
            vec!["ends with <mark>fox</mark>"]
        );
        assert_eq!(previews("fox", "fox", 5, 10), vec!["<mark>fox</mark>"]);
    }

    #[test]
    fn preview_count_is_bounded_in_match_order() {
        let text = "a1 a2 a3 a4 a5";
        assert_eq!(
            previews(text, r"a\d", 0, 3),
            vec!["<mark>a1</mark>", "<mark>a2</mark>", "<mark>a3</mark>"]
        );
    }

    #[test]
    fn matches_do_not_overlap() {
        assert_eq!(previews("aaaa", "aa", 0, 10).len(), 2);
    }

    #[test]
    fn word_widening_is_bounded() {
        let text = "x supercalifragilistic fox";
        assert_eq!(
            previews(text, "fox", 3, 10),
            vec!["istic <mark>fox</mark>"]
        );
    }

    #[test]
    fn context_counts_characters_not_bytes() {
        assert_eq!(
            previews("über straße fox äöü", "fox", 7, 10),
            vec!["straße <mark>fox</mark> äöü"]
        );
    }

    #[test]
    fn case_sensitivity_follows_flag() {
        let strict = compile_pattern("Fox", false).unwrap();
        assert!(collect_previews("a fox", &strict, 5, 10).is_empty());
        assert_eq!(previews("a fox", "Fox", 5, 10), vec!["a <mark>fox</mark>"]);
    }

    #[test]
    fn empty_matches_are_skipped() {
        assert!(previews("abc", "x*", 5, 10).is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(
            compile_pattern("(", false),
            Err(SearchError::InvalidPattern(_))
        ));
    }

    // ============ engine ============

    #[derive(Default)]
    struct FileExtractor {
        calls: AtomicUsize,
    }

    impl TextExtractor for FileExtractor {
        fn extract(&self, path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if text.starts_with("%BROKEN") {
                return Err(ExtractError::Parse {
                    path: path.to_path_buf(),
                    message: "corrupt".into(),
                });
            }
            Ok(text)
        }
    }

    fn engine(tmp: &TempDir, half: usize, limit: usize) -> (SearchEngine, Arc<FileExtractor>) {
        let extractor = Arc::new(FileExtractor::default());
        let settings = SearchSettings {
            cache_dir: tmp.path().join("cache"),
            half_preview_length: half,
            preview_limit: limit,
            concurrency: 2,
        };
        (SearchEngine::new(settings, extractor.clone()), extractor)
    }

    fn doc(tmp: &TempDir, key: &str, body: &str) -> Document {
        let path = tmp.path().join(format!("{}.pdf", key));
        std::fs::write(&path, body).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();
        Document::new(key, key).with_source(path)
    }

    #[tokio::test]
    async fn search_returns_only_matching_documents() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 5, 10);
        let docs = vec![
            doc(&tmp, "A", "the quick brown fox jumps over the lazy dog"),
            doc(&tmp, "B", "nothing to see here"),
            Document::new("C", "no attachment"),
        ];

        let results = engine.search(docs, "fox", true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.key, "A");
        assert_eq!(results[0].previews, vec!["brown <mark>fox</mark> jumps"]);
    }

    #[tokio::test]
    async fn search_joins_hyphenated_words_across_lines() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 4, 10);
        let docs = vec![doc(&tmp, "A", "an inter-\nnational treaty\n\nnote\n")];

        let results = engine.search(docs, "international", false).await.unwrap();
        assert_eq!(results[0].previews, vec!["an <mark>international</mark> treaty"]);
    }

    #[tokio::test]
    async fn no_matches_anywhere_is_empty() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 5, 10);
        let docs = vec![doc(&tmp, "A", "alpha"), doc(&tmp, "B", "beta")];
        assert!(engine.search(docs, "gamma", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_pattern_fails_before_any_io() {
        let tmp = TempDir::new().unwrap();
        let (engine, extractor) = engine(&tmp, 5, 10);
        let docs = vec![doc(&tmp, "A", "(unbalanced")];

        let err = engine.search(docs, "(", false).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidPattern(_)));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(!engine.cache().dir().exists());
    }

    #[tokio::test]
    async fn empty_pattern_returns_nothing_without_io() {
        let tmp = TempDir::new().unwrap();
        let (engine, extractor) = engine(&tmp, 5, 10);
        let docs = vec![doc(&tmp, "A", "text")];
        assert!(engine.search(docs, "", true).await.unwrap().is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn broken_document_does_not_abort_search() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 5, 10);
        let docs = vec![
            doc(&tmp, "BAD", "%BROKEN fox"),
            doc(&tmp, "GOOD", "a red fox"),
        ];

        let results = engine.search(docs, "fox", true).await.unwrap();
        let keys: Vec<&str> = results.iter().map(|r| r.document.key.as_str()).collect();
        assert_eq!(keys, vec!["GOOD"]);
    }

    #[tokio::test]
    async fn repeated_search_reuses_cache() {
        let tmp = TempDir::new().unwrap();
        let (engine, extractor) = engine(&tmp, 5, 10);
        let docs = vec![doc(&tmp, "A", "fox"), doc(&tmp, "B", "fox fox")];

        engine.search(docs.clone(), "fox", true).await.unwrap();
        let results = engine.search(docs, "fox", true).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].previews.len(), 2);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn results_follow_working_set_order() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 5, 10);
        let docs: Vec<Document> = (0..8)
            .map(|i| doc(&tmp, &format!("K{}", i), "match"))
            .collect();

        let results = engine.search(docs, "match", true).await.unwrap();
        let keys: Vec<String> = results.into_iter().map(|r| r.document.key).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("K{}", i)).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn vanished_entry_is_rebuilt_once() {
        let tmp = TempDir::new().unwrap();
        let (engine, extractor) = engine(&tmp, 5, 10);
        let d = doc(&tmp, "A", "content");
        engine.cache().refresh(&d).unwrap();
        std::fs::remove_file(engine.cache().entry_path("A")).unwrap();

        assert_eq!(load_text(engine.cache(), &d).unwrap(), "content");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn vanished_entry_without_source_stays_missing() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(&tmp, 5, 10);
        let d = Document::new("X", "x");
        assert!(matches!(
            load_text(engine.cache(), &d),
            Err(CacheError::Miss(_))
        ));
    }
}
