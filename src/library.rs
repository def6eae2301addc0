//! Library metadata: groupings, items, attachment lookup and aggregation.
//!
//! The search core only sees [`Document`]s. This module is the boundary that
//! turns the Zotero local API's JSON into that schema:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`LibraryProvider`] | Lists collections and the items of a grouping |
//! | [`ZoteroClient`] | `LibraryProvider` over the Zotero local HTTP API |
//! | [`StorageLocator`] | Maps an attachment key to a file on disk |
//! | [`FolderLocator`] | "First file with this extension in `<root>/<key>/`" |
//! | [`merge`] | De-duplicates documents across groupings by key |
//! | [`Library`] | Ties a provider and a locator together |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::error::LibraryError;
use crate::models::{Collection, Document};

/// Items requested per page from the Zotero API.
const PAGE_SIZE: usize = 100;

/// A set of library items to search: one collection or one tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grouping {
    Collection(String),
    Tag(String),
}

#[derive(Error, Debug)]
#[error("grouping must be a collection key or tag:<name>")]
pub struct ParseGroupingError;

impl FromStr for Grouping {
    type Err = ParseGroupingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("tag:") {
            Some(tag) if !tag.trim().is_empty() => Ok(Grouping::Tag(tag.trim().to_string())),
            Some(_) => Err(ParseGroupingError),
            None if is_collection_key(s) => Ok(Grouping::Collection(s.to_string())),
            None => Err(ParseGroupingError),
        }
    }
}

/// Collection keys become a URL path segment, so only ASCII letters and
/// digits are accepted.
fn is_collection_key(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::Collection(key) => write!(f, "{}", key),
            Grouping::Tag(tag) => write!(f, "tag:{}", tag),
        }
    }
}

/// One searchable library item, before its attachment is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryItem {
    pub key: String,
    pub title: String,
    pub publication: Option<String>,
    /// Storage folder name of the item's best attachment, if any.
    pub storage_key: Option<String>,
}

/// Source of library metadata.
#[async_trait]
pub trait LibraryProvider: Send + Sync {
    async fn collections(&self) -> Result<Vec<Collection>, LibraryError>;

    async fn items(&self, grouping: &Grouping) -> Result<Vec<LibraryItem>, LibraryError>;
}

/// Resolves an attachment storage key to the document file.
pub trait StorageLocator: Send + Sync {
    fn locate(&self, storage_key: &str) -> Option<PathBuf>;
}

/// Zotero-style storage: one folder per attachment key, holding the file.
#[derive(Debug, Clone)]
pub struct FolderLocator {
    root: PathBuf,
    extension: String,
}

impl FolderLocator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }
}

impl StorageLocator for FolderLocator {
    /// First regular file (by name) in `<root>/<storage_key>/` carrying the
    /// expected extension, compared case-insensitively.
    fn locate(&self, storage_key: &str) -> Option<PathBuf> {
        let unsafe_key = storage_key.is_empty()
            || storage_key == ".."
            || storage_key.contains(|c: char| c == '/' || c == '\\');
        if unsafe_key {
            return None;
        }
        let folder = self.root.join(storage_key);
        let entries = std::fs::read_dir(&folder).ok()?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, &self.extension))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Unions documents from several groupings, keyed by document key.
///
/// Groupings are applied in order and a later duplicate replaces the earlier
/// value; its position stays where the key first appeared.
pub fn merge<I>(groups: I) -> Vec<Document>
where
    I: IntoIterator<Item = Vec<Document>>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Document> = Vec::new();

    for doc in groups.into_iter().flatten() {
        match positions.get(&doc.key) {
            Some(&i) => merged[i] = doc,
            None => {
                positions.insert(doc.key.clone(), merged.len());
                merged.push(doc);
            }
        }
    }
    merged
}

/// A metadata provider paired with the storage layout it points into.
#[derive(Clone)]
pub struct Library {
    provider: Arc<dyn LibraryProvider>,
    locator: Arc<dyn StorageLocator>,
}

impl Library {
    pub fn new(provider: Arc<dyn LibraryProvider>, locator: Arc<dyn StorageLocator>) -> Self {
        Self { provider, locator }
    }

    pub async fn collections(&self) -> Result<Vec<Collection>, LibraryError> {
        self.provider.collections().await
    }

    /// Builds the de-duplicated working set for the given groupings.
    pub async fn documents(&self, groupings: &[Grouping]) -> Result<Vec<Document>, LibraryError> {
        let mut groups: Vec<Vec<Document>> = Vec::with_capacity(groupings.len());
        for grouping in groupings {
            let items = self.provider.items(grouping).await?;
            debug!("Grouping {} has {} items", grouping, items.len());
            groups.push(items.into_iter().map(|item| self.document_for(item)).collect());
        }
        Ok(merge(groups))
    }

    fn document_for(&self, item: LibraryItem) -> Document {
        let source_path = item
            .storage_key
            .as_deref()
            .and_then(|key| self.locator.locate(key));
        if source_path.is_none() {
            debug!("No attachment file for {}", item.key);
        }
        Document {
            key: item.key,
            title: item.title,
            publication: item.publication,
            source_path,
        }
    }
}

// ============ Zotero local API ============

#[derive(Debug, Deserialize)]
struct ZoteroItem {
    key: String,
    #[serde(default)]
    data: ZoteroItemData,
    #[serde(default)]
    links: ZoteroLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoteroItemData {
    #[serde(default)]
    item_type: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    publication_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ZoteroLinks {
    attachment: Option<ZoteroLink>,
}

#[derive(Debug, Deserialize)]
struct ZoteroLink {
    href: String,
}

impl ZoteroItem {
    /// Notes and attachments are not searchable documents on their own.
    fn into_library_item(self) -> Option<LibraryItem> {
        if matches!(self.data.item_type.as_str(), "note" | "attachment" | "annotation") {
            return None;
        }
        let storage_key = self.links.attachment.and_then(|link| {
            link.href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
        });
        Some(LibraryItem {
            key: self.key,
            title: self.data.title,
            publication: self.data.publication_title.filter(|p| !p.is_empty()),
            storage_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZoteroCollection {
    key: String,
    data: ZoteroCollectionData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoteroCollectionData {
    name: String,
    /// Either a collection key or `false` for top-level collections.
    #[serde(default)]
    parent_collection: serde_json::Value,
}

impl From<ZoteroCollection> for Collection {
    fn from(c: ZoteroCollection) -> Self {
        let parent = match c.data.parent_collection {
            serde_json::Value::String(key) if !key.is_empty() => Some(key),
            _ => None,
        };
        Collection {
            key: c.key,
            name: c.data.name,
            parent,
        }
    }
}

/// Client for the Zotero local API (`http://127.0.0.1:23119/api/users/0`).
#[derive(Debug, Clone)]
pub struct ZoteroClient {
    http: reqwest::Client,
    base_url: String,
}

impl ZoteroClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LibraryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetches every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, LibraryError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut out = Vec::new();
        let mut start = 0usize;

        loop {
            let response = self
                .http
                .get(&url)
                .query(query)
                .query(&[("start", start), ("limit", PAGE_SIZE)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LibraryError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            let body = response.bytes().await?;
            let page: Vec<T> = serde_json::from_slice(&body)
                .map_err(|e| LibraryError::Decode(format!("{}: {}", url, e)))?;
            let count = page.len();
            out.extend(page);

            if count < PAGE_SIZE {
                break;
            }
            start += count;
        }

        Ok(out)
    }
}

#[async_trait]
impl LibraryProvider for ZoteroClient {
    async fn collections(&self) -> Result<Vec<Collection>, LibraryError> {
        let raw: Vec<ZoteroCollection> = self.get_all("collections", &[]).await?;
        Ok(raw.into_iter().map(Collection::from).collect())
    }

    async fn items(&self, grouping: &Grouping) -> Result<Vec<LibraryItem>, LibraryError> {
        let raw: Vec<ZoteroItem> = match grouping {
            Grouping::Collection(key) => {
                self.get_all(&format!("collections/{}/items", key), &[])
                    .await?
            }
            Grouping::Tag(tag) => self.get_all("items", &[("tag", tag.as_str())]).await?,
        };
        Ok(raw
            .into_iter()
            .filter_map(ZoteroItem::into_library_item)
            .collect())
    }
}
