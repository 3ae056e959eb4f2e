//! # Passage Harness CLI (`psg`)
//!
//! The `psg` binary drives the indexing pipeline and exercises the
//! retrieval manager against built artifacts.
//!
//! ## Usage
//!
//! ```bash
//! psg --config ./config/psg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `psg index` | Chunk all posts and write the index artifacts |
//! | `psg search "<query>"` | Ranked passage search via the retrieval manager |
//! | `psg section <id>` | List the chunks of one section of a post |
//! | `psg manifest` | Print the artifact manifest summary |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

use passage_harness::artifact;
use passage_harness::config::{self, Config};
use passage_harness::fetch::{ArtifactFetcher, FsFetcher, HttpFetcher};
use passage_harness::generate;
use passage_harness::models::ChunkResult;
use passage_harness::retrieval::RetrievalManager;

/// Passage Harness CLI — build-time chunking and lexical retrieval for
/// static blog content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/psg.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "psg",
    about = "Passage Harness — chunking and lexical retrieval for static blog content",
    version,
    long_about = "Passage Harness chunks markdown posts into token-budgeted overlapping \
    passages, builds per-post lexical search indexes at build time, and answers ranked \
    passage queries at runtime through a lazily-loading retrieval manager."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/psg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk all published posts and write the index artifacts.
    ///
    /// Produces one artifact per post under `rag-index/`, the manifest,
    /// and the merged legacy artifact at the output root.
    Index {
        /// Show post and chunk counts without writing artifacts.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search indexed passages through the retrieval manager.
    ///
    /// With `--url`, the search scopes to that post first and falls back to
    /// every loaded post; with `--section`, matching restricts to one
    /// section of the post before widening.
    Search {
        /// The search query string.
        query: String,

        /// Current page URL used to scope the search (e.g. `/blog/my-post/`).
        #[arg(long)]
        url: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Restrict matching to one section (heading anchor id).
        #[arg(long)]
        section: Option<String>,

        /// Artifact location: a directory or an http(s) base URL.
        /// Defaults to the configured output dir.
        #[arg(long)]
        from: Option<String>,
    },

    /// List the chunks of one section of a post, in chunk order.
    Section {
        /// Heading anchor id (e.g. `getting-started`).
        id: String,

        /// Current page URL identifying the post.
        #[arg(long)]
        url: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Artifact location: a directory or an http(s) base URL.
        #[arg(long)]
        from: Option<String>,
    },

    /// Print the artifact manifest summary.
    Manifest {
        /// Artifact location: a directory or an http(s) base URL.
        #[arg(long)]
        from: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { dry_run } => {
            generate::run_index(&cfg, dry_run)?;
        }
        Commands::Search {
            query,
            url,
            limit,
            section,
            from,
        } => {
            let manager = RetrievalManager::new(build_fetcher(&cfg, from.as_deref())?);
            let limit = limit.unwrap_or(cfg.retrieval.default_limit);
            let results = manager
                .search_chunks_smart(&query, url.as_deref(), limit, section.as_deref())
                .await;
            print_results(&results);
        }
        Commands::Section {
            id,
            url,
            limit,
            from,
        } => {
            let manager = RetrievalManager::new(build_fetcher(&cfg, from.as_deref())?);
            let limit = limit.unwrap_or(cfg.retrieval.section_limit);
            let results = manager.search_chunks_by_section(&id, &url, limit).await;
            print_results(&results);
        }
        Commands::Manifest { from } => {
            let fetcher = build_fetcher(&cfg, from.as_deref())?;
            let bytes = fetcher.fetch(artifact::MANIFEST_PATH).await?;
            let manifest = artifact::parse_manifest(artifact::MANIFEST_PATH, &bytes)?;
            println!(
                "manifest v{} generated {}",
                manifest.version,
                manifest.generated_at.format("%Y-%m-%dT%H:%M:%SZ")
            );
            for post in &manifest.posts {
                println!(
                    "  {}: {} chunks ({})",
                    post.slug, post.chunk_count, post.index_file
                );
            }
            println!(
                "  total: {} posts, {} chunks",
                manifest.posts.len(),
                manifest.posts.iter().map(|p| p.chunk_count).sum::<usize>()
            );
        }
    }

    Ok(())
}

/// Pick the fetcher for an artifact location: an http(s) base URL gets the
/// HTTP fetcher with the configured timeout, anything else is a directory.
fn build_fetcher(cfg: &Config, from: Option<&str>) -> Result<Arc<dyn ArtifactFetcher>> {
    let timeout = Duration::from_secs(cfg.retrieval.fetch_timeout_secs);
    match from {
        Some(base) if base.starts_with("http://") || base.starts_with("https://") => {
            Ok(Arc::new(HttpFetcher::new(Url::parse(base)?, timeout)?))
        }
        Some(base) => Ok(Arc::new(FsFetcher::new(base))),
        None => Ok(Arc::new(FsFetcher::new(&cfg.output.dir))),
    }
}

fn print_results(results: &[ChunkResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / chunk {}",
            i + 1,
            result.score,
            result.post_title,
            result.chunk_index
        );
        if let Some(title) = &result.section_title {
            println!("    section: {}", title);
        }
        println!("    url: {}", result.post_url);

        let flat = result.text.replace('\n', " ");
        let excerpt: String = flat.chars().take(240).collect();
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!("    id: {}", result.chunk_id);
        println!();
    }
}
