//! # Zotero Search Preview CLI (`zsp`)
//!
//! ## Usage
//!
//! ```bash
//! zsp --config ./config/zsp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `zsp search <pattern> --group <g>` | Regex search with highlighted previews |
//! | `zsp collections` | List library collections and their keys |
//! | `zsp cache warm --group <g>` | Extract and cache attachments ahead of time |
//! | `zsp cache clear` | Delete every cached text entry |
//! | `zsp serve` | Start the JSON HTTP server |
//!
//! A group is a collection key (`PE3MSZKI`) or a tag (`tag:to read`).
//! Logging goes to stderr; set `RUST_LOG` or pass `-v` for more detail.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use zotero_search_preview::config::load_config;
use zotero_search_preview::context::AppContext;
use zotero_search_preview::library::Grouping;
use zotero_search_preview::models::SearchResult;
use zotero_search_preview::server;

/// Zotero Search Preview: regex search over your Zotero attachments.
#[derive(Parser)]
#[command(
    name = "zsp",
    about = "Full-text regex search with highlighted previews over a local Zotero library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/zsp.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search attachments of one or more groups.
    ///
    /// The pattern is a regular expression. Invalid patterns are rejected
    /// before the library is contacted.
    Search {
        /// Regular expression to look for.
        pattern: String,

        /// Collection key or `tag:<name>`. Repeat to search several groups.
        #[arg(long = "group", short = 'g', required = true)]
        groups: Vec<Grouping>,

        /// Match without regard to case.
        #[arg(long, short = 'i')]
        ignore_case: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List library collections.
    Collections {
        /// Print collections as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage the extracted-text cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the JSON HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Extract and cache every attachment in the given groups.
    Warm {
        #[arg(long = "group", short = 'g', required = true)]
        groups: Vec<Grouping>,
    },

    /// Delete every cached entry.
    Clear,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    let ctx = AppContext::from_config(&config)?;

    match cli.command {
        Commands::Search {
            pattern,
            groups,
            ignore_case,
            json,
        } => {
            let results = ctx
                .engine
                .search_library(&ctx.library, &groups, &pattern, ignore_case)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::Collections { json } => {
            let collections = ctx
                .library
                .collections()
                .await
                .context("Failed to list collections")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&collections)?);
            } else {
                for c in &collections {
                    match &c.parent {
                        Some(parent) => println!("{}  {}  (in {})", c.key, c.name, parent),
                        None => println!("{}  {}", c.key, c.name),
                    }
                }
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Warm { groups } => {
                let docs = ctx
                    .library
                    .documents(&groups)
                    .await
                    .context("Failed to resolve groups")?;
                let report = ctx.engine.cache().ensure_fresh(&docs).await;
                println!("cache warm");
                println!("  documents:   {}", docs.len());
                println!("  up to date:  {}", report.fresh);
                println!("  rebuilt:     {}", report.rebuilt);
                println!("  no file:     {}", report.unresolved);
                println!("  failed:      {}", report.failed.len());
                for (key, err) in &report.failed {
                    println!("    {}: {}", key, err);
                }
            }
            CacheAction::Clear => {
                let dir = ctx.engine.cache().dir().to_path_buf();
                let removed = ctx
                    .engine
                    .cache()
                    .clear()
                    .with_context(|| format!("Failed to clear cache at {}", dir.display()))?;
                println!("Removed {} cache entries from {}", removed, dir.display());
            }
        },
        Commands::Serve => {
            server::run_server(ctx, &config.server.bind).await?;
        }
    }

    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let doc = &result.document;
        match &doc.publication {
            Some(publication) => {
                println!("{}. {} ({}) [{}]", i + 1, doc.title, publication, doc.key)
            }
            None => println!("{}. {} [{}]", i + 1, doc.title, doc.key),
        }
        for preview in &result.previews {
            println!("    ... {} ...", preview);
        }
        println!();
    }
}
