//! # Passage Harness
//!
//! A build-time chunking and lexical retrieval pipeline for static blog
//! content.
//!
//! Passage Harness splits long-form posts into token-budgeted overlapping
//! passages tagged with section metadata, builds a serializable per-post
//! search index, and serves ranked passage queries at runtime through a
//! lazily-loading retrieval manager. Retrieval is purely lexical: there is
//! no embedding model anywhere in the pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Content  │──▶│ Chunk + Index │──▶│ JSON artifacts │
//! │ (md+yaml)│   │  (build time) │   │ per post + man │
//! └──────────┘   └───────────────┘   └──────┬────────┘
//!                                           │ fetch (fs/http)
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │  Retrieval    │
//!                                   │  Manager      │
//!                                   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! psg index                          # build artifacts into the output dir
//! psg search "error handling" --url /blog/my-post/
//! psg section getting-started --url /blog/my-post/
//! psg manifest                       # artifact summary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`content`] | Filesystem content source (frontmatter posts) |
//! | [`markdown`] | Heading extraction and markdown cleanup |
//! | [`chunk`] | Token-budgeted chunking with section association |
//! | [`lexical`] | Serializable weighted-field search index |
//! | [`artifact`] | Artifact schemas and path contract |
//! | [`generate`] | Build-time artifact pipeline |
//! | [`fetch`] | Artifact fetcher abstraction (fs/http) |
//! | [`retrieval`] | Runtime retrieval manager |
//! | [`error`] | Retrieval error taxonomy |

pub mod artifact;
pub mod chunk;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod generate;
pub mod lexical;
pub mod markdown;
pub mod models;
pub mod retrieval;
