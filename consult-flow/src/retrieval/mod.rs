//! Retrieval pipeline: ingest → index → query → filter → format.
//!
//! [`RetrievalContract`] is what the dialogue and QA flows depend on. [`VectorRetriever`] is the
//! bundled implementation; anything else that honours the contract can be swapped in.

pub mod chunking;
pub mod embedding;
pub mod index;
pub mod manager;
pub mod vector_retriever;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{IngestError, QueryError};

pub use embedding::{EMBED_BATCH_SIZE, Embedder, EmbeddingError, OpenAiCompatibleEmbedder};
pub use index::VectorIndex;
pub use manager::{IndexStatus, IngestReport, RagManager};
pub use vector_retriever::VectorRetriever;

/// Marker a backend may emit in place of a real hit. Never surfaced to consumers.
pub const NO_INFORMATION_FOUND: &str = "No suitable information retrieved";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSnippet {
    pub text: String,
    /// Within [0, 1]; higher is closer.
    pub similarity: f32,
}

impl RetrievalSnippet {
    pub fn new(text: impl Into<String>, similarity: f32) -> Self {
        Self {
            text: text.into(),
            similarity,
        }
    }

    pub fn is_informative(&self) -> bool {
        !self.text.contains(NO_INFORMATION_FOUND)
    }
}

/// Drops sentinel snippets, keeping backend ranking order.
pub fn filter_snippets(snippets: Vec<RetrievalSnippet>) -> Vec<RetrievalSnippet> {
    snippets.into_iter().filter(|s| s.is_informative()).collect()
}

/// Joins the text of every informative snippet, best-first.
pub fn format_snippets(snippets: &[RetrievalSnippet], separator: &str) -> String {
    snippets
        .iter()
        .filter(|s| s.is_informative())
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// A source document for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(name, String::from_utf8_lossy(bytes).into_owned())
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, &bytes))
    }
}

/// Opaque handle to one built index. Cloning shares the same immutable snapshot.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    corpus_id: Option<String>,
    index: Arc<VectorIndex>,
}

impl IndexHandle {
    pub fn persistent(corpus_id: impl Into<String>, index: VectorIndex) -> Self {
        Self {
            corpus_id: Some(corpus_id.into()),
            index: Arc::new(index),
        }
    }

    pub fn ephemeral(index: VectorIndex) -> Self {
        Self {
            corpus_id: None,
            index: Arc::new(index),
        }
    }

    pub fn corpus_id(&self) -> Option<&str> {
        self.corpus_id.as_deref()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.corpus_id.is_none()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
pub trait RetrievalContract: Send + Sync {
    /// Builds and persists the index for `corpus_id`, replacing any previous one.
    async fn ingest(
        &self,
        corpus_id: &str,
        documents: Vec<Document>,
    ) -> Result<IndexHandle, IngestError>;

    /// Opens a previously persisted corpus.
    async fn open(&self, corpus_id: &str) -> Result<IndexHandle, IngestError>;

    /// Names of persisted corpora, sorted.
    async fn list_corpora(&self) -> Vec<String>;

    /// At most `top_k` snippets with similarity at or above the threshold, best-first.
    /// Finding nothing is an empty result, not an error.
    async fn query(
        &self,
        index: &IndexHandle,
        text: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<RetrievalSnippet>, QueryError>;

    /// Volatile index over a single text blob; never touches persistent storage.
    async fn create_ephemeral(&self, text: &str) -> Result<IndexHandle, IngestError>;
}

pub fn validate_query(top_k: usize, similarity_threshold: f32) -> Result<(), QueryError> {
    if top_k == 0 {
        return Err(QueryError::InvalidParameters("top_k must be at least 1".into()));
    }
    if !(0.0..=1.0).contains(&similarity_threshold) {
        return Err(QueryError::InvalidParameters(format!(
            "similarity threshold must be within [0, 1], got {similarity_threshold}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippets() -> Vec<RetrievalSnippet> {
        vec![
            RetrievalSnippet::new("Patient has high blood pressure.", 0.8),
            RetrievalSnippet::new(
                "No suitable information retrieved from records with similarity_threshold = 0.6",
                0.1,
            ),
            RetrievalSnippet::new("Patient is 45 years old.", 0.7),
        ]
    }

    #[test]
    fn test_format_drops_sentinel_and_keeps_order() {
        let text = format_snippets(&snippets(), "\n\n");
        assert_eq!(
            text,
            "Patient has high blood pressure.\n\nPatient is 45 years old."
        );
        assert!(!text.contains(NO_INFORMATION_FOUND));
    }

    #[test]
    fn test_filter_keeps_ranking() {
        let kept = filter_snippets(snippets());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].similarity, 0.8);
        assert_eq!(kept[1].similarity, 0.7);
    }

    #[test]
    fn test_format_of_only_sentinels_is_empty() {
        let only = vec![RetrievalSnippet::new(NO_INFORMATION_FOUND, 0.0)];
        assert_eq!(format_snippets(&only, "\n"), "");
    }

    #[test]
    fn test_validate_query_bounds() {
        assert!(validate_query(1, 0.0).is_ok());
        assert!(validate_query(3, 1.0).is_ok());
        assert!(validate_query(0, 0.5).is_err());
        assert!(validate_query(3, 1.5).is_err());
    }

    #[test]
    fn test_document_from_bytes_is_lossy() {
        let doc = Document::from_bytes("report.txt", b"ok \xFF");
        assert_eq!(doc.name, "report.txt");
        assert!(doc.text.starts_with("ok "));
    }
}
