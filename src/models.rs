//! Core data models used throughout the search pipeline.
//!
//! These types are built fresh for every query from library metadata and are
//! never persisted; only extracted text is cached on disk.

use serde::Serialize;
use std::path::PathBuf;

/// One library item that may be searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Stable library key, unique within the library.
    pub key: String,
    pub title: String,
    pub publication: Option<String>,
    /// Attachment file on disk. `None` when the storage lookup found nothing.
    pub source_path: Option<PathBuf>,
}

impl Document {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            publication: None,
            source_path: None,
        }
    }

    pub fn with_publication(mut self, publication: impl Into<String>) -> Self {
        self.publication = Some(publication.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// A document with at least one highlighted preview.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub document: Document,
    /// Highlighted snippets in left-to-right match order.
    pub previews: Vec<String>,
}

/// A library collection, for listing only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub key: String,
    pub name: String,
    pub parent: Option<String>,
}
