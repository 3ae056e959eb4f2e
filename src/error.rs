//! Failure classes for artifact loading.

use thiserror::Error;

use crate::fetch::FetchError;

/// What went wrong while loading the manifest or an index artifact.
///
/// Manifest failures make the retrieval manager fall back to the legacy
/// merged artifact; per-post failures propagate to the caller, which
/// degrades to the cross-document scope instead of failing the query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The manifest or an index artifact is absent at its well-known path.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The artifact was fetched but is not a valid index artifact: invalid
    /// JSON, or JSON lacking the chunk collection or the search index.
    #[error("malformed artifact {path}: {reason}")]
    ArtifactMalformed { path: String, reason: String },

    /// The underlying fetch failed (I/O, HTTP status, timeout).
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
