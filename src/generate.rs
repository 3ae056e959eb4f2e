//! Build-time artifact generation.
//!
//! Orchestrates the full indexing flow: content loading, chunking, index
//! building, and artifact writing. Emits one index artifact per post, a
//! manifest listing every post, and a merged legacy artifact kept for
//! deployments that predate per-post indexes.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;

use crate::artifact::{
    self, IndexArtifact, Manifest, PostSummary, FORMAT_VERSION, LEGACY_FORMAT_VERSION,
};
use crate::chunk::chunk_document;
use crate::config::Config;
use crate::content;
use crate::lexical::{Field, LexicalIndex, LexicalIndexBuilder};
use crate::models::Chunk;

/// Run the build pipeline: chunk every published post and write the
/// per-post artifacts, the manifest, and the legacy merged artifact.
pub fn run_index(config: &Config, dry_run: bool) -> Result<()> {
    let documents = content::load_documents(config)?;

    if dry_run {
        println!("index (dry-run)");
        println!("  posts found: {}", documents.len());
        let total: usize = documents
            .iter()
            .map(|doc| chunk_document(doc, &config.chunking).len())
            .sum();
        println!("  estimated chunks: {}", total);
        return Ok(());
    }

    let out_dir = &config.output.dir;
    fs::create_dir_all(out_dir.join("rag-index"))
        .with_context(|| format!("Failed to create output dir: {}", out_dir.display()))?;

    let generated_at = Utc::now();
    let mut summaries: Vec<PostSummary> = Vec::new();
    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut total_bytes = 0u64;

    for doc in &documents {
        let chunks = chunk_document(doc, &config.chunking);
        let index = build_chunk_index(&chunks);
        let art = IndexArtifact {
            chunks: chunks.clone(),
            index,
            version: FORMAT_VERSION.to_string(),
            generated_at,
        };

        let path = out_dir.join(artifact::post_index_path(&doc.slug));
        let bytes = write_json(&path, &art)?;
        total_bytes += bytes;

        println!(
            "  {}: {} chunks ({:.2} KB)",
            doc.slug,
            chunks.len(),
            bytes as f64 / 1024.0
        );

        summaries.push(PostSummary {
            slug: doc.slug.clone(),
            title: doc.title.clone(),
            url: doc.url.clone(),
            date: doc.date,
            tags: doc.tags.clone(),
            chunk_count: chunks.len(),
            index_file: format!("/rag-index/{}.json", doc.slug),
        });
        all_chunks.extend(chunks);
    }

    // The manifest is rebuilt wholesale on every run.
    let manifest = Manifest {
        version: FORMAT_VERSION.to_string(),
        generated_at,
        posts: summaries,
    };
    total_bytes += write_json(&out_dir.join(artifact::MANIFEST_PATH), &manifest)?;

    // Merged legacy artifact over the union of all posts.
    let legacy = IndexArtifact {
        index: build_chunk_index(&all_chunks),
        version: LEGACY_FORMAT_VERSION.to_string(),
        generated_at,
        chunks: all_chunks,
    };
    total_bytes += write_json(&out_dir.join(artifact::LEGACY_INDEX_PATH), &legacy)?;

    println!("index");
    println!("  posts indexed: {}", manifest.posts.len());
    println!(
        "  chunks written: {}",
        manifest.posts.iter().map(|p| p.chunk_count).sum::<usize>()
    );
    println!("  total size: {:.2} MB", total_bytes as f64 / (1024.0 * 1024.0));
    println!("ok");

    Ok(())
}

/// Build the weighted-field search index over a set of chunks.
pub fn build_chunk_index(chunks: &[Chunk]) -> LexicalIndex {
    let mut builder = LexicalIndexBuilder::new();
    for chunk in chunks {
        let tags = chunk.metadata.post_tags.join(" ");
        builder.add_document(
            &chunk.metadata.chunk_id,
            &[
                (Field::Text, chunk.text.as_str()),
                (
                    Field::SectionTitle,
                    chunk.metadata.section_title.as_deref().unwrap_or(""),
                ),
                (Field::PostTitle, chunk.metadata.post_title.as_str()),
                (Field::PostTags, tags.as_str()),
            ],
        );
    }
    builder.build()
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<u64> {
    let json = serde_json::to_vec(value)?;
    fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(json.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, ContentConfig, OutputConfig, RetrievalConfig, SiteConfig};

    fn test_config(root: &Path, out: &Path) -> Config {
        Config {
            site: SiteConfig {
                base_url: "https://example.com".to_string(),
            },
            content: ContentConfig {
                root: root.to_path_buf(),
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

    fn write_post(dir: &Path, name: &str, title: &str, body: &str) {
        std::fs::write(
            dir.join(name),
            format!("---\ntitle: {title}\ndate: 2026-02-01\ntags: [notes]\n---\n\n{body}"),
        )
        .unwrap();
    }

    #[test]
    fn test_run_index_writes_all_artifacts() {
        let content_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_post(
            content_dir.path(),
            "alpha.md",
            "Alpha",
            "## Intro\n\nSome alpha content about chunk pipelines.",
        );
        write_post(
            content_dir.path(),
            "beta.md",
            "Beta",
            "## Start\n\nSome beta content about retrieval quality.",
        );

        let config = test_config(content_dir.path(), out_dir.path());
        run_index(&config, false).unwrap();

        let manifest_bytes = fs::read(out_dir.path().join("rag-index/manifest.json")).unwrap();
        let manifest = artifact::parse_manifest("rag-index/manifest.json", &manifest_bytes).unwrap();
        assert_eq!(manifest.posts.len(), 2);
        assert_eq!(manifest.posts[0].slug, "alpha");
        assert_eq!(manifest.posts[0].index_file, "/rag-index/alpha.json");
        assert!(manifest.posts.iter().all(|p| p.chunk_count >= 1));

        for slug in ["alpha", "beta"] {
            let bytes = fs::read(out_dir.path().join(format!("rag-index/{slug}.json"))).unwrap();
            let art = artifact::parse_index_artifact("x", &bytes).unwrap();
            assert!(!art.chunks.is_empty());
            assert_eq!(art.version, FORMAT_VERSION);
        }

        let legacy_bytes = fs::read(out_dir.path().join("rag-index.json")).unwrap();
        let legacy = artifact::parse_index_artifact("rag-index.json", &legacy_bytes).unwrap();
        assert_eq!(legacy.version, LEGACY_FORMAT_VERSION);
        // Legacy spans both posts.
        assert!(legacy
            .chunks
            .iter()
            .any(|c| c.metadata.post_slug == "alpha"));
        assert!(legacy.chunks.iter().any(|c| c.metadata.post_slug == "beta"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let content_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_post(content_dir.path(), "alpha.md", "Alpha", "Some content.");

        let config = test_config(content_dir.path(), out_dir.path());
        run_index(&config, true).unwrap();

        assert!(!out_dir.path().join("rag-index").exists());
        assert!(!out_dir.path().join("rag-index.json").exists());
    }
}
