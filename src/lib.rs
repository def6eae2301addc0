//! # Zotero Search Preview
//!
//! Full-text regex search over the attachments of a local Zotero library,
//! with highlighted context previews for every match.
//!
//! Attachment text (PDF text layer plus annotation contents) is extracted
//! once and cached on disk; the cache is rebuilt whenever the attachment
//! file is newer than its entry. Queries are a linear scan over the cached
//! text: there is no index and no ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Zotero API   │──▶│  Library    │──▶│ SearchEngine │
//! │ + storage/   │   │ merge/dedup │   │ regex scan   │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌───────────┐      ┌───────────┐
//!                    │CacheStore │─────▶│ Extractor │
//!                    │ text/*.txt│      │  (lopdf)  │
//!                    └───────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! zsp collections                          # list collection keys
//! zsp search "neural (net|network)s?" --group PE3MSZKI -i
//! zsp search "entropy" --group PE3MSZKI --group "tag:to read"
//! zsp cache warm --group PE3MSZKI          # pre-extract attachments
//! zsp serve                                # JSON API on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | PDF text + annotation extraction |
//! | [`cache`] | On-disk extracted-text cache |
//! | [`library`] | Zotero client, storage lookup, aggregation |
//! | [`search`] | Normalization, regex scan, previews |
//! | [`pool`] | Bounded blocking worker pool |
//! | [`context`] | Component wiring from configuration |
//! | [`server`] | JSON HTTP server |

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod library;
pub mod models;
pub mod pool;
pub mod search;
pub mod server;
