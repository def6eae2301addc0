//! Wiring from [`Config`] to the running components.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::extract::PdfExtractor;
use crate::library::{FolderLocator, Library, ZoteroClient};
use crate::search::SearchEngine;

/// Everything a command or request handler needs to run a query.
#[derive(Clone)]
pub struct AppContext {
    pub engine: SearchEngine,
    pub library: Library,
}

impl AppContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ZoteroClient::new(config.library.api_url.clone())
            .context("Failed to create Zotero API client")?;
        let locator = FolderLocator::new(
            config.library.storage_dir.clone(),
            config.library.extension.clone(),
        );

        Ok(Self {
            engine: SearchEngine::new(config.search_settings(), Arc::new(PdfExtractor::new())),
            library: Library::new(Arc::new(client), Arc::new(locator)),
        })
    }
}
