use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub library: LibraryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreviewConfig {
    /// Characters of context kept on each side of a match. `0` shows the
    /// match alone.
    #[serde(default = "default_half_length")]
    pub half_length: usize,
    /// Maximum previews per document.
    #[serde(default = "default_preview_limit")]
    pub limit: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            half_length: default_half_length(),
            limit: default_preview_limit(),
        }
    }
}

fn default_half_length() -> usize {
    60
}
fn default_preview_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Zotero `storage/` directory holding one folder per attachment.
    pub storage_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_api_url() -> String {
    "http://127.0.0.1:23119/api/users/0".to_string()
}
fn default_extension() -> String {
    "pdf".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// The values the cache store and search engine run with.
///
/// Built once from [`Config`] and passed in at construction; nothing in the
/// core reads configuration from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub cache_dir: PathBuf,
    pub half_preview_length: usize,
    pub preview_limit: usize,
    pub concurrency: usize,
}

impl SearchSettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            half_preview_length: default_half_length(),
            preview_limit: default_preview_limit(),
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            cache_dir: self.cache.dir.clone(),
            half_preview_length: self.preview.half_length,
            preview_limit: self.preview.limit,
            concurrency: self.search.concurrency,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.preview.limit < 1 {
        anyhow::bail!("preview.limit must be >= 1");
    }
    if config.search.concurrency < 1 {
        anyhow::bail!("search.concurrency must be >= 1");
    }

    let ext = config.library.extension.trim_start_matches('.').to_string();
    if ext.is_empty() {
        anyhow::bail!("library.extension must not be empty");
    }
    config.library.extension = ext;

    config.library.storage_dir = expand_home(&config.library.storage_dir);
    config.cache.dir = expand_home(&config.cache.dir);

    Ok(config)
}

/// Expands a leading `~` using `$HOME`. Other paths pass through unchanged.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
