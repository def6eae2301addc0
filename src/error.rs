//! Error types for the search core.
//!
//! Per-document failures ([`ExtractError`], [`CacheError`]) shrink the result
//! set but never abort a query. Query-level failures ([`SearchError`]) abort
//! before any cache or scan work starts.

use std::path::PathBuf;

use thiserror::Error;

/// Text extraction failed for one source document.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Cache store failures, scoped to a single document key.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cache entry for key {0}")]
    Miss(String),

    #[error("cache io error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction failed for key {key}: {source}")]
    Extract {
        key: String,
        #[source]
        source: ExtractError,
    },
}

/// Errors talking to the library metadata provider.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("library request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("library returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("unexpected library response: {0}")]
    Decode(String),
}

/// Query-level failures. No partial results accompany these.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error(transparent)]
    Library(#[from] LibraryError),
}
