//! Artifact schemas and the path contract shared with the static host.
//!
//! The chunker writes three kinds of JSON artifacts; the retrieval manager
//! only ever reads them. Deserialization goes through typed schemas, so an
//! artifact that parses as JSON but lacks the chunk collection or the
//! search index is rejected as malformed instead of failing later on a
//! missing field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::lexical::LexicalIndex;
use crate::models::Chunk;

/// Format version written to per-post artifacts and the manifest.
pub const FORMAT_VERSION: &str = "2.0.0";
/// Format version of the merged legacy artifact.
pub const LEGACY_FORMAT_VERSION: &str = "1.0.0";

/// Well-known manifest location, relative to the artifact root.
pub const MANIFEST_PATH: &str = "rag-index/manifest.json";
/// Well-known legacy merged artifact location.
pub const LEGACY_INDEX_PATH: &str = "rag-index.json";

/// Per-post artifact location.
pub fn post_index_path(slug: &str) -> String {
    format!("rag-index/{slug}.json")
}

/// One post's row in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub slug: String,
    pub title: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub chunk_count: usize,
    /// Site-absolute location of the post's index artifact.
    pub index_file: String,
}

/// The directory of all posts and their artifact locations. Regenerated
/// wholesale on every build, never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub posts: Vec<PostSummary>,
}

/// A per-post index artifact: the post's chunks plus its serialized search
/// index. The legacy artifact has the same shape over all posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexArtifact {
    pub chunks: Vec<Chunk>,
    pub index: LexicalIndex,
    pub version: String,
    pub generated_at: DateTime<Utc>,
}

/// Decode a manifest, classifying any decode failure as malformed.
pub fn parse_manifest(path: &str, bytes: &[u8]) -> Result<Manifest, RetrievalError> {
    serde_json::from_slice(bytes).map_err(|err| RetrievalError::ArtifactMalformed {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

/// Decode an index artifact, classifying any decode failure as malformed.
pub fn parse_index_artifact(path: &str, bytes: &[u8]) -> Result<IndexArtifact, RetrievalError> {
    serde_json::from_slice(bytes).map_err(|err| RetrievalError::ArtifactMalformed {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_index_path() {
        assert_eq!(post_index_path("my-post"), "rag-index/my-post.json");
    }

    #[test]
    fn test_artifact_missing_index_is_malformed() {
        // Valid JSON, but no search index.
        let json = br#"{"chunks": [], "version": "2.0.0", "generatedAt": "2026-01-01T00:00:00Z"}"#;
        let err = parse_index_artifact("rag-index/x.json", json).unwrap_err();
        assert!(matches!(err, RetrievalError::ArtifactMalformed { .. }));
    }

    #[test]
    fn test_artifact_invalid_json_is_malformed() {
        let err = parse_index_artifact("rag-index/x.json", b"not json").unwrap_err();
        assert!(matches!(err, RetrievalError::ArtifactMalformed { .. }));
    }

    #[test]
    fn test_manifest_round_trip() {
        let manifest = Manifest {
            version: FORMAT_VERSION.to_string(),
            generated_at: Utc::now(),
            posts: vec![PostSummary {
                slug: "alpha".to_string(),
                title: "Alpha".to_string(),
                url: "https://example.com/blog/alpha/".to_string(),
                date: Utc::now(),
                tags: vec!["a".to_string()],
                chunk_count: 3,
                index_file: "/rag-index/alpha.json".to_string(),
            }],
        };
        let json = serde_json::to_vec(&manifest).unwrap();
        let reloaded = parse_manifest(MANIFEST_PATH, &json).unwrap();
        assert_eq!(reloaded.posts.len(), 1);
        assert_eq!(reloaded.posts[0].slug, "alpha");
        assert_eq!(reloaded.posts[0].chunk_count, 3);

        // camelCase keys on the wire.
        let text = String::from_utf8(json).unwrap();
        assert!(text.contains("generatedAt"));
        assert!(text.contains("chunkCount"));
        assert!(text.contains("indexFile"));
    }
}
