//! Runtime retrieval manager.
//!
//! Loads per-post index artifacts lazily, keyed by the post slug derived
//! from the caller's current URL, and answers ranked passage queries with a
//! tiered strategy: exact section-title match, then partial section-title
//! match, then full-text lexical relevance. Queries scope to the current
//! post first and fall back to every loaded post.
//!
//! One instance is shared per process. Construct it at the composition
//! root with the fetcher for your artifact location and pass it by
//! reference to consumers; state lives behind an async mutex, so loads
//! triggered by concurrent callers coalesce into a single fetch.
//!
//! Load failures degrade instead of erroring out of a query: a missing
//! current-post index must not prevent the caller from getting any answer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::artifact::{self, Manifest};
use crate::error::RetrievalError;
use crate::fetch::{ArtifactFetcher, FetchError};
use crate::lexical::{self, LexicalIndex, ScoredRef};
use crate::models::{Chunk, ChunkResult};

/// Sentinel index key used when the manifest is unavailable and the merged
/// legacy artifact is loaded instead.
const LEGACY_KEY: &str = "__legacy__";

/// Score for an exact section-title match.
const SECTION_EXACT_SCORE: f64 = 10.0;
/// Score for a partial (containment) section-title match.
const SECTION_PARTIAL_SCORE: f64 = 8.0;
/// Uniform score for structural section lookups.
const SECTION_FILTER_SCORE: f64 = 1.0;

#[derive(Default)]
struct ManagerState {
    /// Loaded search indexes, keyed by post slug (or [`LEGACY_KEY`]).
    indexes: HashMap<String, LexicalIndex>,
    /// Chunks accumulated across all loaded posts, keyed by chunk id.
    chunks: HashMap<String, Chunk>,
    /// Manifest, fetched once and cached.
    manifest: Option<Manifest>,
    /// Keys already loaded; loading an entry twice is a no-op.
    loaded: HashSet<String>,
}

/// Lazily-loading, tiered passage retrieval over the built artifacts.
pub struct RetrievalManager {
    fetcher: Arc<dyn ArtifactFetcher>,
    state: Mutex<ManagerState>,
}

impl RetrievalManager {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        RetrievalManager {
            fetcher,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Ensure the indexes needed to serve queries are loaded.
    ///
    /// Fetches and caches the manifest on first call, then loads the index
    /// of the post identified by `current_url`. Without a derivable slug,
    /// every post in the manifest is loaded. If the manifest cannot be
    /// obtained at all, the merged legacy artifact is loaded instead.
    ///
    /// Concurrent callers serialize on the state lock; whoever arrives
    /// second finds the work done and returns immediately. A failed load
    /// is not cached, so the next call retries.
    pub async fn load_index(&self, current_url: Option<&str>) -> Result<(), RetrievalError> {
        let mut state = self.state.lock().await;
        self.load_index_locked(&mut state, current_url).await
    }

    async fn load_index_locked(
        &self,
        state: &mut ManagerState,
        current_url: Option<&str>,
    ) -> Result<(), RetrievalError> {
        match self.ensure_manifest(state).await {
            Ok(()) => match current_url.and_then(post_slug_from_url) {
                Some(slug) => self.load_post_locked(state, &slug).await,
                None => {
                    debug!("no post slug derivable from URL, loading all post indexes");
                    let slugs: Vec<String> = state
                        .manifest
                        .as_ref()
                        .map(|m| m.posts.iter().map(|p| p.slug.clone()).collect())
                        .unwrap_or_default();
                    for slug in slugs {
                        self.load_post_locked(state, &slug).await?;
                    }
                    Ok(())
                }
            },
            Err(err) => {
                warn!(error = %err, "manifest unavailable, falling back to legacy index");
                self.load_legacy_locked(state).await
            }
        }
    }

    async fn ensure_manifest(&self, state: &mut ManagerState) -> Result<(), RetrievalError> {
        if state.manifest.is_some() {
            return Ok(());
        }
        let bytes = self.fetch_artifact(artifact::MANIFEST_PATH).await?;
        let manifest = artifact::parse_manifest(artifact::MANIFEST_PATH, &bytes)?;
        debug!(posts = manifest.posts.len(), "manifest loaded");
        state.manifest = Some(manifest);
        Ok(())
    }

    /// Load one post's index artifact. Idempotent per slug; propagates
    /// missing or malformed artifacts without installing partial data.
    async fn load_post_locked(
        &self,
        state: &mut ManagerState,
        slug: &str,
    ) -> Result<(), RetrievalError> {
        if state.loaded.contains(slug) {
            return Ok(());
        }
        let path = artifact::post_index_path(slug);
        let bytes = self.fetch_artifact(&path).await?;
        let art = artifact::parse_index_artifact(&path, &bytes)?;
        debug!(slug, chunks = art.chunks.len(), "post index loaded");
        install_artifact(state, slug, art);
        Ok(())
    }

    async fn load_legacy_locked(&self, state: &mut ManagerState) -> Result<(), RetrievalError> {
        if state.loaded.contains(LEGACY_KEY) {
            return Ok(());
        }
        let bytes = self.fetch_artifact(artifact::LEGACY_INDEX_PATH).await?;
        let art = artifact::parse_index_artifact(artifact::LEGACY_INDEX_PATH, &bytes)?;
        debug!(chunks = art.chunks.len(), "legacy index loaded");
        install_artifact(state, LEGACY_KEY, art);
        Ok(())
    }

    async fn fetch_artifact(&self, path: &str) -> Result<Vec<u8>, RetrievalError> {
        match self.fetcher.fetch(path).await {
            Ok(bytes) => Ok(bytes),
            Err(FetchError::NotFound(path)) => Err(RetrievalError::ArtifactNotFound(path)),
            Err(err) => Err(RetrievalError::Fetch(err)),
        }
    }

    /// Best-effort bulk load of additional posts for cross-post search.
    /// Individual failures are logged and skipped.
    pub async fn load_additional_posts(&self, slugs: &[String]) {
        let mut state = self.state.lock().await;
        for slug in slugs {
            if let Err(err) = self.load_post_locked(&mut state, slug).await {
                warn!(slug = %slug, error = %err, "failed to load additional post index");
            }
        }
    }

    /// The primary ranked-retrieval entry point.
    ///
    /// Tier order: the named section of the current post (when `section_id`
    /// is given), then the current post, then everything already loaded.
    /// Each tier runs the match cascade: exact section-title match (10.0),
    /// partial section-title match (8.0), then lexical relevance. The first
    /// tier with results wins.
    ///
    /// Never errors: a load failure for the current post degrades to the
    /// wider scope, and an unparseable query yields empty results.
    pub async fn search_chunks_smart(
        &self,
        query: &str,
        current_url: Option<&str>,
        limit: usize,
        section_id: Option<&str>,
    ) -> Vec<ChunkResult> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut state = self.state.lock().await;
        let slug = current_url.and_then(post_slug_from_url);

        if let (Some(section), Some(slug)) = (section_id, slug.as_deref()) {
            self.ensure_post_loaded(&mut state, slug).await;
            if state.indexes.contains_key(slug) {
                let results = match_cascade(&state, query, limit, Some(slug), Some(section));
                if !results.is_empty() {
                    return results;
                }
            }
        }

        if let Some(slug) = slug.as_deref() {
            self.ensure_post_loaded(&mut state, slug).await;
            if state.indexes.contains_key(slug) {
                let results = match_cascade(&state, query, limit, Some(slug), None);
                if !results.is_empty() {
                    return results;
                }
            }
        }

        // Cross-post scope over whatever is loaded; bootstrap a load if
        // nothing is.
        if state.indexes.is_empty() {
            if let Err(err) = self.load_index_locked(&mut state, current_url).await {
                warn!(error = %err, "index load failed, returning no results");
                return Vec::new();
            }
        }
        match_cascade(&state, query, limit, None, section_id)
    }

    /// Return up to `limit` chunks of the current post whose section id
    /// equals `section_id`, in chunk order. A structural filter, not a
    /// relevance search: all results score 1.0.
    pub async fn search_chunks_by_section(
        &self,
        section_id: &str,
        current_url: &str,
        limit: usize,
    ) -> Vec<ChunkResult> {
        let Some(slug) = post_slug_from_url(current_url) else {
            warn!(url = current_url, "no post slug derivable from URL for section lookup");
            return Vec::new();
        };

        let mut state = self.state.lock().await;
        if !state.loaded.contains(&slug) {
            if let Err(err) = self.load_post_locked(&mut state, &slug).await {
                warn!(slug = %slug, error = %err, "failed to load post index for section lookup");
                return Vec::new();
            }
        }

        let mut results: Vec<ChunkResult> = state
            .chunks
            .values()
            .filter(|c| {
                c.metadata.post_slug == slug && c.metadata.section_id.as_deref() == Some(section_id)
            })
            .map(|c| ChunkResult::from_chunk(c, SECTION_FILTER_SCORE))
            .collect();
        results.sort_by_key(|r| r.chunk_index);
        results.truncate(limit);
        results
    }

    /// Load the current post's index for a query path, logging instead of
    /// propagating: a missing current-post index degrades the scope, it
    /// does not fail the query.
    async fn ensure_post_loaded(&self, state: &mut ManagerState, slug: &str) {
        if state.loaded.contains(slug) {
            return;
        }
        if let Err(err) = self.load_post_locked(state, slug).await {
            warn!(slug = %slug, error = %err, "failed to load current post index, degrading scope");
        }
    }

    /// Whether any index has been loaded.
    pub async fn is_loaded(&self) -> bool {
        !self.state.lock().await.indexes.is_empty()
    }

    /// Total number of chunks across all loaded posts.
    pub async fn chunk_count(&self) -> usize {
        self.state.lock().await.chunks.len()
    }

    /// Look up a loaded chunk by id.
    pub async fn get_chunk(&self, chunk_id: &str) -> Option<Chunk> {
        self.state.lock().await.chunks.get(chunk_id).cloned()
    }
}

fn install_artifact(state: &mut ManagerState, key: &str, art: artifact::IndexArtifact) {
    state.indexes.insert(key.to_string(), art.index);
    for chunk in art.chunks {
        state.chunks.insert(chunk.metadata.chunk_id.clone(), chunk);
    }
    state.loaded.insert(key.to_string());
}

/// Run the match cascade within a chunk scope.
///
/// Scope: `slug` restricts to one post's chunks and index; `section_id`
/// restricts to chunks of one section. Cascade: section-title matching
/// first (exact 10.0, containment 8.0, deduplicated by chunk id keeping
/// the higher score, ordered by score then chunk index); only when that
/// finds nothing, lexical relevance over the scope's indexes.
fn match_cascade(
    state: &ManagerState,
    query: &str,
    limit: usize,
    slug: Option<&str>,
    section_id: Option<&str>,
) -> Vec<ChunkResult> {
    let in_scope = |chunk: &Chunk| -> bool {
        if let Some(slug) = slug {
            if chunk.metadata.post_slug != slug {
                return false;
            }
        }
        if let Some(section) = section_id {
            if chunk.metadata.section_id.as_deref() != Some(section) {
                return false;
            }
        }
        true
    };

    let normalized = normalize_title(query);
    let normalized_bare = strip_colons(&normalized);

    let mut by_id: HashMap<&str, (f64, &Chunk)> = HashMap::new();
    for chunk in state.chunks.values() {
        if !in_scope(chunk) {
            continue;
        }
        let Some(title) = chunk.metadata.section_title.as_deref() else {
            continue;
        };
        let title_norm = normalize_title(title);
        let title_bare = strip_colons(&title_norm);

        let score = if title_norm == normalized
            || (!title_bare.is_empty() && title_bare == normalized_bare)
        {
            SECTION_EXACT_SCORE
        } else if title_norm.contains(&normalized)
            || normalized.contains(&title_norm)
            || (!title_bare.is_empty()
                && !normalized_bare.is_empty()
                && (title_bare.contains(&normalized_bare) || normalized_bare.contains(&title_bare)))
        {
            SECTION_PARTIAL_SCORE
        } else {
            continue;
        };

        by_id
            .entry(chunk.metadata.chunk_id.as_str())
            .and_modify(|entry| {
                if score > entry.0 {
                    *entry = (score, chunk);
                }
            })
            .or_insert((score, chunk));
    }

    if !by_id.is_empty() {
        let mut results: Vec<ChunkResult> = by_id
            .values()
            .map(|(score, chunk)| ChunkResult::from_chunk(chunk, *score))
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        results.truncate(limit);
        return results;
    }

    // Lexical fallback across the scope's indexes.
    let mut scored: Vec<(f64, &Chunk)> = Vec::new();
    for (key, index) in &state.indexes {
        if let Some(slug) = slug {
            if key != slug {
                continue;
            }
        }
        for ScoredRef { doc_ref, score } in search_with_retry(index, query) {
            // The legacy index spans posts, so re-check scope per chunk.
            if let Some(chunk) = state.chunks.get(&doc_ref) {
                if in_scope(chunk) {
                    scored.push((score, chunk));
                }
            }
        }
    }
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.metadata.chunk_id.cmp(&b.1.metadata.chunk_id))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(score, chunk)| ChunkResult::from_chunk(chunk, score))
        .collect()
}

/// Sanitize and run a lexical query; on a syntax rejection, retry once with
/// aggressive stripping; on a second rejection, return nothing. A search
/// with no results is a valid end state, never an error.
fn search_with_retry(index: &LexicalIndex, query: &str) -> Vec<ScoredRef> {
    let sanitized = lexical::sanitize_query(query);
    if sanitized.is_empty() {
        return Vec::new();
    }
    match index.search(&sanitized) {
        Ok(results) => results,
        Err(err) => {
            warn!(error = %err, query, "query rejected by lexical engine, retrying stripped");
            let stripped = lexical::strip_query(query);
            if stripped.is_empty() {
                return Vec::new();
            }
            index.search(&stripped).unwrap_or_default()
        }
    }
}

/// Derive the post slug from a page URL: the path segment following
/// `/blog/`. Tolerates absolute URLs, trailing slashes, and query or
/// fragment suffixes.
pub fn post_slug_from_url(url: &str) -> Option<String> {
    let path = if url.contains("://") {
        match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.to_string(),
        }
    } else {
        url.to_string()
    };

    let (_, rest) = path.split_once("/blog/")?;
    let slug: String = rest
        .chars()
        .take_while(|&c| c != '/' && c != '?' && c != '#')
        .collect();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Lowercase, trim, collapse internal whitespace.
fn normalize_title(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Colon-insensitive variant of a normalized title.
fn strip_colons(text: &str) -> String {
    let without: String = text.chars().filter(|&c| c != ':').collect();
    without.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_bare_path() {
        assert_eq!(
            post_slug_from_url("/blog/my-post/").as_deref(),
            Some("my-post")
        );
        assert_eq!(
            post_slug_from_url("/blog/my-post").as_deref(),
            Some("my-post")
        );
    }

    #[test]
    fn test_slug_from_absolute_url() {
        assert_eq!(
            post_slug_from_url("https://example.com/blog/my-post/").as_deref(),
            Some("my-post")
        );
        assert_eq!(
            post_slug_from_url("https://example.com/blog/my-post?ref=home#section").as_deref(),
            Some("my-post")
        );
    }

    #[test]
    fn test_slug_from_query_suffix_on_bare_path() {
        assert_eq!(
            post_slug_from_url("/blog/my-post?utm=1").as_deref(),
            Some("my-post")
        );
        assert_eq!(
            post_slug_from_url("/blog/my-post#notes").as_deref(),
            Some("my-post")
        );
    }

    #[test]
    fn test_slug_unresolvable() {
        assert_eq!(post_slug_from_url("/about/"), None);
        assert_eq!(post_slug_from_url("https://example.com/"), None);
        assert_eq!(post_slug_from_url("/blog/"), None);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Caching   Strategy "), "caching strategy");
        assert_eq!(normalize_title("MIXED Case"), "mixed case");
    }

    #[test]
    fn test_strip_colons() {
        assert_eq!(strip_colons("note: caching"), "note caching");
        assert_eq!(strip_colons("a:b"), "ab");
    }
}
