//! End-to-end tests of the retrieval manager against built artifacts.
//!
//! Artifacts are generated into a tempdir with the real build pipeline and
//! fetched back through the filesystem fetcher, so these tests cover the
//! full serialize/reload path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use passage_harness::config::{
    ChunkingConfig, Config, ContentConfig, OutputConfig, RetrievalConfig, SiteConfig,
};
use passage_harness::error::RetrievalError;
use passage_harness::fetch::{ArtifactFetcher, FetchError, FsFetcher};
use passage_harness::generate;
use passage_harness::retrieval::RetrievalManager;

fn corpus_config(content: &Path, out: &Path) -> Config {
    Config {
        site: SiteConfig {
            base_url: "https://example.com".to_string(),
        },
        content: ContentConfig {
            root: content.to_path_buf(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec![],
        },
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        output: OutputConfig {
            dir: out.to_path_buf(),
        },
    }
}

/// A post body with one `##` heading per section, each followed by three
/// paragraphs of roughly 110 tokens, enough for one chunk per section.
fn post_body(sections: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (heading, seed) in sections {
        body.push_str(&format!("## {heading}\n\n"));
        for i in 0..3 {
            let sentence = format!(
                "{seed} paragraph {i} covers the pipeline in detail with enough prose to fill \
                 a realistic block of text for the chunker to work against. "
            );
            body.push_str(&sentence.repeat(3));
            body.push_str("\n\n");
        }
    }
    body
}

fn write_post(dir: &Path, name: &str, title: &str, body: &str) {
    std::fs::write(
        dir.join(name),
        format!("---\ntitle: {title}\ndate: 2026-02-01\ntags: [fixtures]\n---\n\n{body}"),
    )
    .unwrap();
}

/// Build a two-post corpus and return its artifact directory.
fn build_corpus() -> (tempfile::TempDir, tempfile::TempDir) {
    let content = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    write_post(
        content.path(),
        "alpha.md",
        "Alpha Post",
        &post_body(&[
            ("Getting Started", "The alpha getting started guide"),
            ("Caching Strategy", "The alpha caching approach"),
        ]),
    );
    write_post(
        content.path(),
        "beta.md",
        "Beta Post",
        &post_body(&[("Deployment Notes", "The beta deployment zeppelin notes")]),
    );

    generate::run_index(&corpus_config(content.path(), out.path()), false).unwrap();
    (content, out)
}

fn manager_for(out: &Path) -> RetrievalManager {
    RetrievalManager::new(Arc::new(FsFetcher::new(out)))
}

/// Wraps a fetcher and counts fetches per path.
struct CountingFetcher {
    inner: FsFetcher,
    counts: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    fn new(base: &Path) -> Self {
        CountingFetcher {
            inner: FsFetcher::new(base),
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn count(&self, path: &str) -> usize {
        self.counts.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ArtifactFetcher for CountingFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert(0) += 1;
        self.inner.fetch(path).await
    }
}

#[tokio::test]
async fn test_exact_heading_title_scores_ten() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    let results = manager
        .search_chunks_smart("Getting Started", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].score, 10.0);
    assert_eq!(results[0].section_title.as_deref(), Some("Getting Started"));
    assert_eq!(results[0].post_slug, "alpha");

    // Case and whitespace insensitive.
    let results = manager
        .search_chunks_smart("  getting   STARTED ", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].score, 10.0);
}

#[tokio::test]
async fn test_partial_heading_title_scores_eight() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    let results = manager
        .search_chunks_smart("Caching", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].score, 8.0);
    assert_eq!(results[0].section_title.as_deref(), Some("Caching Strategy"));
}

#[tokio::test]
async fn test_colon_query_does_not_error() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    // Must come back as a (possibly empty) result set, never a fault.
    let results = manager
        .search_chunks_smart("Note: caching", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(results.iter().all(|r| r.post_slug == "alpha"));
}

#[tokio::test]
async fn test_section_lookup_is_ordered_and_filtered() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    let results = manager
        .search_chunks_by_section("caching-strategy", "/blog/alpha/", 10)
        .await;
    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.section_id.as_deref(), Some("caching-strategy"));
        assert_eq!(result.score, 1.0);
    }
    for pair in results.windows(2) {
        assert!(pair[0].chunk_index < pair[1].chunk_index);
    }
}

#[tokio::test]
async fn test_section_scope_restricts_lexical_matches() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    // "pipeline" appears in every section's text; the section filter must
    // restrict matches to the named section.
    let results = manager
        .search_chunks_smart(
            "pipeline",
            Some("/blog/alpha/"),
            5,
            Some("caching-strategy"),
        )
        .await;
    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.section_id.as_deref(), Some("caching-strategy"));
    }
}

#[tokio::test]
async fn test_cross_post_fallback_when_current_post_lacks_matches() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());

    // Load the whole corpus, then query from alpha for a term that only
    // beta contains.
    manager.load_index(None).await.unwrap();
    let results = manager
        .search_chunks_smart("zeppelin", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].post_slug, "beta");
}

#[tokio::test]
async fn test_lazy_load_only_current_post() {
    let (_content, out) = build_corpus();
    let fetcher = Arc::new(CountingFetcher::new(out.path()));
    let manager = RetrievalManager::new(fetcher.clone());

    manager.load_index(Some("/blog/alpha/")).await.unwrap();
    assert_eq!(fetcher.count("rag-index/alpha.json"), 1);
    assert_eq!(fetcher.count("rag-index/beta.json"), 0);
    assert!(manager.is_loaded().await);
}

#[tokio::test]
async fn test_unresolvable_url_loads_every_post() {
    let (_content, out) = build_corpus();
    let fetcher = Arc::new(CountingFetcher::new(out.path()));
    let manager = RetrievalManager::new(fetcher.clone());

    manager.load_index(Some("/about/")).await.unwrap();
    assert_eq!(fetcher.count("rag-index/alpha.json"), 1);
    assert_eq!(fetcher.count("rag-index/beta.json"), 1);
}

#[tokio::test]
async fn test_concurrent_loads_fetch_manifest_once() {
    let (_content, out) = build_corpus();
    let fetcher = Arc::new(CountingFetcher::new(out.path()));
    let manager = Arc::new(RetrievalManager::new(fetcher.clone()));

    let (a, b, c, d) = tokio::join!(
        manager.load_index(Some("/blog/alpha/")),
        manager.load_index(Some("/blog/alpha/")),
        manager.load_index(Some("/blog/alpha/")),
        manager.load_index(Some("/blog/alpha/")),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    d.unwrap();

    assert_eq!(fetcher.count("rag-index/manifest.json"), 1);
    assert_eq!(fetcher.count("rag-index/alpha.json"), 1);
}

#[tokio::test]
async fn test_repeated_load_is_idempotent() {
    let (_content, out) = build_corpus();
    let fetcher = Arc::new(CountingFetcher::new(out.path()));
    let manager = RetrievalManager::new(fetcher.clone());

    manager.load_index(Some("/blog/alpha/")).await.unwrap();
    let chunk_count = manager.chunk_count().await;
    manager.load_index(Some("/blog/alpha/")).await.unwrap();

    assert_eq!(fetcher.count("rag-index/manifest.json"), 1);
    assert_eq!(fetcher.count("rag-index/alpha.json"), 1);
    assert_eq!(manager.chunk_count().await, chunk_count);
}

#[tokio::test]
async fn test_legacy_fallback_without_manifest() {
    let (_content, out) = build_corpus();
    // Leave only the merged legacy artifact behind.
    std::fs::remove_dir_all(out.path().join("rag-index")).unwrap();

    let manager = manager_for(out.path());
    manager.load_index(Some("/blog/alpha/")).await.unwrap();

    // Chunks from every post arrive through the legacy index.
    let results = manager
        .search_chunks_smart("zeppelin", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].post_slug, "beta");
}

#[tokio::test]
async fn test_missing_everything_is_an_error() {
    let out = tempfile::tempdir().unwrap();
    let manager = manager_for(out.path());

    let err = manager.load_index(Some("/blog/alpha/")).await.unwrap_err();
    assert!(matches!(err, RetrievalError::ArtifactNotFound(_)));
}

#[tokio::test]
async fn test_malformed_artifact_errors_then_recovers() {
    let (_content, out) = build_corpus();
    let artifact_path = out.path().join("rag-index/alpha.json");
    let good = std::fs::read(&artifact_path).unwrap();

    std::fs::write(&artifact_path, b"{\"chunks\": []}").unwrap();
    let err = manager_for(out.path())
        .load_index(Some("/blog/alpha/"))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::ArtifactMalformed { .. }));

    // A failed load is not cached: restoring the artifact and retrying on
    // the same manager succeeds.
    let manager = manager_for(out.path());
    std::fs::write(&artifact_path, b"broken").unwrap();
    assert!(manager.load_index(Some("/blog/alpha/")).await.is_err());
    std::fs::write(&artifact_path, &good).unwrap();
    manager.load_index(Some("/blog/alpha/")).await.unwrap();
}

#[tokio::test]
async fn test_degraded_search_when_current_post_artifact_is_broken() {
    let (_content, out) = build_corpus();
    std::fs::write(out.path().join("rag-index/alpha.json"), b"broken").unwrap();

    let manager = manager_for(out.path());
    manager.load_index(Some("/blog/beta/")).await.unwrap();

    // The current post's index cannot load; the query degrades to the
    // loaded cross-post scope instead of failing.
    let results = manager
        .search_chunks_smart("zeppelin", Some("/blog/alpha/"), 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].post_slug, "beta");
}

#[tokio::test]
async fn test_get_chunk_and_counts() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());
    assert!(!manager.is_loaded().await);
    assert_eq!(manager.chunk_count().await, 0);

    manager.load_index(Some("/blog/alpha/")).await.unwrap();
    assert!(manager.is_loaded().await);
    assert!(manager.chunk_count().await >= 2);

    let chunk = manager.get_chunk("alpha-chunk-0").await.unwrap();
    assert_eq!(chunk.metadata.post_slug, "alpha");
    assert_eq!(chunk.metadata.chunk_index, 0);
    assert!(manager.get_chunk("alpha-chunk-999").await.is_none());
}

#[tokio::test]
async fn test_load_additional_posts_best_effort() {
    let (_content, out) = build_corpus();
    let manager = manager_for(out.path());
    manager.load_index(Some("/blog/alpha/")).await.unwrap();

    manager
        .load_additional_posts(&["beta".to_string(), "missing".to_string()])
        .await;

    // beta arrived, the missing slug was skipped without failing.
    let results = manager
        .search_chunks_smart("zeppelin", None, 5, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].post_slug, "beta");
}
