//! Core data models used throughout Passage Harness.
//!
//! These types represent the documents, headings, chunks, and search results
//! that flow through the indexing and retrieval pipeline. Chunk metadata is
//! serialized with camelCase keys to match the artifact contract consumed by
//! the site's runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published article, as loaded from the content source.
///
/// Immutable once loaded; drafts and hidden posts never become documents.
#[derive(Debug, Clone)]
pub struct Document {
    pub slug: String,
    pub title: String,
    /// Canonical URL of the post (`{base_url}/blog/{slug}/`).
    pub url: String,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Raw body text, markdown with heading markers.
    pub body: String,
}

/// A structural heading extracted from a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Anchor id: explicit `{#id}` if present, otherwise slugified title.
    pub id: String,
    pub title: String,
    /// Byte offset of the heading in the *original* (uncleaned) body.
    pub offset: usize,
}

/// Denormalized chunk metadata, self-contained for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// `{postSlug}-chunk-{chunkIndex}`, unique within a document.
    pub chunk_id: String,
    pub post_url: String,
    pub post_title: String,
    pub post_slug: String,
    pub post_date: DateTime<Utc>,
    pub post_tags: Vec<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Anchor id of the nearest heading at or before this chunk, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

/// A bounded, overlapping span of a document's cleaned text, the unit of
/// retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A scored passage returned from the retrieval manager.
///
/// Carries enough source metadata for the caller to build citations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub chunk_id: String,
    pub text: String,
    pub post_url: String,
    pub post_title: String,
    pub post_slug: String,
    pub post_date: DateTime<Utc>,
    pub post_tags: Vec<String>,
    pub chunk_index: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

impl ChunkResult {
    pub fn from_chunk(chunk: &Chunk, score: f64) -> Self {
        let meta = &chunk.metadata;
        ChunkResult {
            chunk_id: meta.chunk_id.clone(),
            text: chunk.text.clone(),
            post_url: meta.post_url.clone(),
            post_title: meta.post_title.clone(),
            post_slug: meta.post_slug.clone(),
            post_date: meta.post_date,
            post_tags: meta.post_tags.clone(),
            chunk_index: meta.chunk_index,
            score,
            section_id: meta.section_id.clone(),
            section_title: meta.section_title.clone(),
        }
    }
}
