//! On-disk cache of extracted document text.
//!
//! Each document key maps to one `.txt` file under the cache directory. An
//! entry is valid only while its modification time is strictly newer than
//! the source file's; otherwise it is rebuilt through the [`TextExtractor`].
//!
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so a concurrent reader sees either the previous entry or the
//! complete new one, never a partial write.
//!
//! Entries are never removed automatically. [`CacheStore::clear`] exists for
//! explicit maintenance only.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::SearchSettings;
use crate::error::{CacheError, ExtractError};
use crate::extract::TextExtractor;
use crate::models::Document;
use crate::pool;

const ENTRY_EXTENSION: &str = "txt";

/// One persisted text blob.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub text: String,
    /// Modification time of the entry file.
    pub last_built: SystemTime,
}

/// What [`CacheStore::refresh`] did for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Existing entry was newer than the source.
    Fresh,
    /// Entry was missing or stale and has been rewritten.
    Rebuilt,
    /// Document has no source file; nothing can be cached.
    Unresolved,
}

/// Outcome of [`CacheStore::ensure_fresh`] across a working set.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub fresh: usize,
    pub rebuilt: usize,
    pub unresolved: usize,
    pub failed: Vec<(String, CacheError)>,
}

impl RefreshReport {
    fn record(&mut self, freshness: Freshness) {
        match freshness {
            Freshness::Fresh => self.fresh += 1,
            Freshness::Rebuilt => self.rebuilt += 1,
            Freshness::Unresolved => self.unresolved += 1,
        }
    }

    /// Keys whose refresh failed.
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|(key, _)| key.as_str())
    }
}

#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    extractor: Arc<dyn TextExtractor>,
    concurrency: usize,
}

impl CacheStore {
    pub fn new(settings: &SearchSettings, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            dir: settings.cache_dir.clone(),
            extractor,
            concurrency: settings.concurrency,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry file for `key`.
    ///
    /// Keys made only of ASCII alphanumerics, `-` and `_` are used verbatim;
    /// anything else is replaced by the hex SHA-256 of the key so it can never
    /// escape the cache directory.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let safe = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        let stem = if safe {
            key.to_string()
        } else {
            hex::encode(Sha256::digest(key.as_bytes()))
        };
        self.dir.join(format!("{}.{}", stem, ENTRY_EXTENSION))
    }

    /// Brings the entry for one document up to date. Blocking.
    pub fn refresh(&self, doc: &Document) -> Result<Freshness, CacheError> {
        let Some(source) = doc.source_path.as_deref() else {
            debug!("No source file for {}; not cached", doc.key);
            return Ok(Freshness::Unresolved);
        };

        let source_mtime = modified(source).map_err(|source_err| CacheError::Extract {
            key: doc.key.clone(),
            source: ExtractError::Io {
                path: source.to_path_buf(),
                source: source_err,
            },
        })?;

        let entry = self.entry_path(&doc.key);
        match modified(&entry) {
            Ok(built) if built > source_mtime => {
                debug!("Cache hit for {}", doc.key);
                return Ok(Freshness::Fresh);
            }
            Ok(_) => debug!("Cache entry for {} is stale", doc.key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache entry for {}", doc.key)
            }
            Err(e) => {
                return Err(CacheError::Io {
                    key: doc.key.clone(),
                    source: e,
                })
            }
        }

        self.build(&doc.key, source)?;
        Ok(Freshness::Rebuilt)
    }

    /// Re-extracts a document regardless of the current entry's age.
    pub fn rebuild(&self, doc: &Document) -> Result<(), CacheError> {
        match doc.source_path.as_deref() {
            Some(source) => self.build(&doc.key, source),
            None => Err(CacheError::Miss(doc.key.clone())),
        }
    }

    fn build(&self, key: &str, source: &Path) -> Result<(), CacheError> {
        let text = self
            .extractor
            .extract(source)
            .map_err(|source| CacheError::Extract {
                key: key.to_string(),
                source,
            })?;
        self.write_atomic(key, &text)
            .map_err(|source| CacheError::Io {
                key: key.to_string(),
                source,
            })?;
        info!("Cached {} ({} bytes)", key, text.len());
        Ok(())
    }

    fn write_atomic(&self, key: &str, text: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.entry_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Refreshes every document on the worker pool and waits for all of them.
    ///
    /// Failures are per document: they are logged, collected in the report,
    /// and never stop the other documents.
    pub async fn ensure_fresh(&self, documents: &[Document]) -> RefreshReport {
        let store = self.clone();
        let outcomes = pool::map_blocking(documents.to_vec(), self.concurrency, move |doc| {
            let result = store.refresh(&doc);
            (doc.key, result)
        })
        .await;

        let mut report = RefreshReport::default();
        for (key, result) in outcomes.into_iter().flatten() {
            match result {
                Ok(freshness) => report.record(freshness),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    report.failed.push((key, e));
                }
            }
        }

        debug!(
            "Cache refresh: {} fresh, {} rebuilt, {} unresolved, {} failed",
            report.fresh,
            report.rebuilt,
            report.unresolved,
            report.failed.len()
        );
        report
    }

    /// Reads the persisted entry for `key`.
    pub fn read(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let path = self.entry_path(key);
        let io_err = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::Miss(key.to_string()))
            }
            Err(e) => return Err(io_err(e)),
        };
        let last_built = modified(&path).map_err(io_err)?;

        Ok(CacheEntry { text, last_built })
    }

    /// Deletes every entry in the cache directory. Returns how many were removed.
    pub fn clear(&self) -> std::io::Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            let is_entry = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION);
            if is_entry {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!("Removed {} cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}
