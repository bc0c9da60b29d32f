use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{Document, IndexHandle, RetrievalContract, RetrievalSnippet, filter_snippets};
use crate::error::IngestError;

/// Lifecycle of the manager's currently loaded corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "corpus", rename_all = "snake_case")]
pub enum IndexStatus {
    NotInitialized,
    /// Opened from persisted storage.
    Loaded(String),
    /// Freshly built from uploaded documents.
    Indexed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub corpus_id: String,
    pub documents: usize,
    pub chunks: usize,
}

struct Loaded {
    handle: Option<IndexHandle>,
    status: IndexStatus,
}

/// Owns the currently loaded corpus and converts retrieval failures into data.
///
/// Callers above this boundary never see a `QueryError`: a failed query becomes a single snippet
/// carrying the error text with similarity 0.0.
pub struct RagManager {
    contract: Arc<dyn RetrievalContract>,
    loaded: RwLock<Loaded>,
}

impl RagManager {
    pub fn new(contract: Arc<dyn RetrievalContract>) -> Self {
        Self {
            contract,
            loaded: RwLock::new(Loaded {
                handle: None,
                status: IndexStatus::NotInitialized,
            }),
        }
    }

    pub fn contract(&self) -> Arc<dyn RetrievalContract> {
        self.contract.clone()
    }

    pub async fn status(&self) -> IndexStatus {
        self.loaded.read().await.status.clone()
    }

    pub async fn current_corpus(&self) -> Option<String> {
        self.loaded
            .read()
            .await
            .handle
            .as_ref()
            .and_then(|h| h.corpus_id().map(str::to_string))
    }

    pub async fn list_corpora(&self) -> Vec<String> {
        self.contract.list_corpora().await
    }

    /// Indexes `documents` as `corpus_id` and makes it the current corpus.
    pub async fn process_files(
        &self,
        corpus_id: &str,
        documents: Vec<Document>,
    ) -> Result<IngestReport, IngestError> {
        let count = documents.len();
        match self.contract.ingest(corpus_id, documents).await {
            Ok(handle) => {
                let report = IngestReport {
                    corpus_id: corpus_id.to_string(),
                    documents: count,
                    chunks: handle.chunk_count(),
                };
                let mut loaded = self.loaded.write().await;
                loaded.handle = Some(handle);
                loaded.status = IndexStatus::Indexed(corpus_id.to_string());
                Ok(report)
            }
            Err(e) => {
                error!(corpus = %corpus_id, error = %e, "failed to index corpus");
                self.loaded.write().await.status = IndexStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Opens a persisted corpus and makes it current. Returns its chunk count.
    pub async fn load_corpus(&self, corpus_id: &str) -> Result<usize, IngestError> {
        match self.contract.open(corpus_id).await {
            Ok(handle) => {
                let chunks = handle.chunk_count();
                let mut loaded = self.loaded.write().await;
                loaded.handle = Some(handle);
                loaded.status = IndexStatus::Loaded(corpus_id.to_string());
                Ok(chunks)
            }
            Err(e) => {
                warn!(corpus = %corpus_id, error = %e, "failed to load corpus");
                self.loaded.write().await.status = IndexStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Queries the current corpus. No corpus loaded yields an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        similarity_threshold: f32,
        top_k: usize,
    ) -> Vec<RetrievalSnippet> {
        let handle = self.loaded.read().await.handle.clone();
        match handle {
            Some(handle) => {
                self.retrieve_from(&handle, query, similarity_threshold, top_k)
                    .await
            }
            None => Vec::new(),
        }
    }

    /// Queries an explicit index with the same sentinel filtering and error conversion.
    pub async fn retrieve_from(
        &self,
        index: &IndexHandle,
        query: &str,
        similarity_threshold: f32,
        top_k: usize,
    ) -> Vec<RetrievalSnippet> {
        match self
            .contract
            .query(index, query, top_k, similarity_threshold)
            .await
        {
            Ok(snippets) => filter_snippets(snippets),
            Err(e) => {
                warn!(corpus = ?index.corpus_id(), error = %e, "retrieval failed");
                vec![RetrievalSnippet::new(format!("retrieval failed: {e}"), 0.0)]
            }
        }
    }

    /// Builds a volatile index for one session's grounding text. Failures are logged, not raised.
    pub async fn create_ephemeral(&self, text: &str) -> Option<IndexHandle> {
        match self.contract.create_ephemeral(text).await {
            Ok(handle) => {
                info!(chunks = handle.chunk_count(), "grounding index ready");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "grounding index not built");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::NO_INFORMATION_FOUND;
    use crate::test_support::StaticRetrieval;

    #[tokio::test]
    async fn test_retrieve_without_corpus_is_empty() {
        let manager = RagManager::new(Arc::new(StaticRetrieval::default()));
        assert!(manager.retrieve("anything", 0.7, 3).await.is_empty());
        assert_eq!(manager.status().await, IndexStatus::NotInitialized);
    }

    #[tokio::test]
    async fn test_retrieve_filters_sentinel() {
        let retrieval = StaticRetrieval::with_snippets(vec![
            RetrievalSnippet::new("Hypertension since 2019.", 0.82),
            RetrievalSnippet::new(NO_INFORMATION_FOUND, 0.0),
            RetrievalSnippet::new("Takes amlodipine daily.", 0.74),
        ]);
        let manager = RagManager::new(Arc::new(retrieval));
        manager
            .process_files("kb", vec![Document::new("a.txt", "text")])
            .await
            .unwrap();

        let hits = manager.retrieve("blood pressure", 0.7, 3).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "Hypertension since 2019.");
        assert_eq!(hits[1].text, "Takes amlodipine daily.");
    }

    #[tokio::test]
    async fn test_query_error_becomes_single_snippet() {
        let manager = RagManager::new(Arc::new(StaticRetrieval::failing("index offline")));
        manager.load_corpus("kb").await.unwrap();

        let hits = manager.retrieve("anything", 0.5, 3).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 0.0);
        assert!(hits[0].text.contains("index offline"));
    }

    #[tokio::test]
    async fn test_status_tracks_ingest_and_load() {
        let manager = RagManager::new(Arc::new(StaticRetrieval::default()));

        let report = manager
            .process_files("gastro", vec![Document::new("a.txt", "x")])
            .await
            .unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(manager.status().await, IndexStatus::Indexed("gastro".into()));
        assert_eq!(manager.current_corpus().await.as_deref(), Some("gastro"));

        manager.load_corpus("cardio").await.unwrap();
        assert_eq!(manager.status().await, IndexStatus::Loaded("cardio".into()));

        assert!(manager.process_files("empty", Vec::new()).await.is_err());
        assert!(matches!(manager.status().await, IndexStatus::Failed(_)));
        assert_eq!(manager.current_corpus().await.as_deref(), Some("cardio"));
    }

    #[tokio::test]
    async fn test_create_ephemeral_swallows_failure() {
        let manager = RagManager::new(Arc::new(StaticRetrieval::default()));
        assert!(manager.create_ephemeral("   ").await.is_none());
        assert!(manager.create_ephemeral("BP 160/95").await.is_some());
    }
}
