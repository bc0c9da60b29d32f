use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{
    Document, IndexHandle, RetrievalContract, RetrievalSnippet, chunking::chunk_text,
    embedding::{Embedder, embed_in_batches},
    index::{IndexedChunk, VectorIndex},
    validate_query,
};
use crate::config::RetrievalConfig;
use crate::error::{IngestError, QueryError};

const INDEX_FILE: &str = "index.json";

/// Embedding-backed retriever persisting one JSON index per corpus under `data_dir`.
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    data_dir: PathBuf,
    chunk_chars: usize,
    ingest_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            data_dir: config.data_dir.clone(),
            chunk_chars: config.chunk_chars,
            ingest_locks: DashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn corpus_dir(&self, corpus_id: &str) -> Result<PathBuf, IngestError> {
        let trimmed = corpus_id.trim();
        if trimmed.is_empty() {
            return Err(IngestError::EmptyInput("corpus name is empty".into()));
        }
        let unsafe_name = trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
            || trimmed != corpus_id;
        if unsafe_name {
            return Err(IngestError::InvalidCorpusId(corpus_id.to_string()));
        }
        Ok(self.data_dir.join(corpus_id))
    }

    fn ingest_lock(&self, corpus_id: &str) -> Arc<Mutex<()>> {
        self.ingest_locks
            .entry(corpus_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn build_index<'a>(
        &self,
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<VectorIndex, IngestError> {
        let mut pieces: Vec<(String, String)> = Vec::new();
        for (source, text) in sources {
            for chunk in chunk_text(text, self.chunk_chars) {
                pieces.push((source.to_string(), chunk));
            }
        }
        if pieces.is_empty() {
            return Err(IngestError::EmptyInput("documents contain no text".into()));
        }

        let texts: Vec<String> = pieces.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = embed_in_batches(self.embedder.as_ref(), &texts)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        let chunks = pieces
            .into_iter()
            .zip(embeddings)
            .map(|((source, text), embedding)| IndexedChunk {
                source,
                text,
                embedding,
            })
            .collect();
        Ok(VectorIndex::new(chunks))
    }
}

#[async_trait]
impl RetrievalContract for VectorRetriever {
    async fn ingest(
        &self,
        corpus_id: &str,
        documents: Vec<Document>,
    ) -> Result<IndexHandle, IngestError> {
        let dir = self.corpus_dir(corpus_id)?;
        if documents.is_empty() {
            return Err(IngestError::EmptyInput("no documents supplied".into()));
        }

        let lock = self.ingest_lock(corpus_id);
        let _guard = lock.lock().await;

        let index = self
            .build_index(documents.iter().map(|d| (d.name.as_str(), d.text.as_str())))
            .await?;

        tokio::fs::create_dir_all(&dir).await?;
        let staging = dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&staging, serde_json::to_vec(&index)?).await?;
        tokio::fs::rename(&staging, dir.join(INDEX_FILE)).await?;

        info!(
            corpus = %corpus_id,
            documents = documents.len(),
            chunks = index.len(),
            "corpus indexed"
        );
        Ok(IndexHandle::persistent(corpus_id, index))
    }

    async fn open(&self, corpus_id: &str) -> Result<IndexHandle, IngestError> {
        let path = self.corpus_dir(corpus_id)?.join(INDEX_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::UnknownCorpus(corpus_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let index: VectorIndex = serde_json::from_slice(&bytes)?;
        info!(corpus = %corpus_id, chunks = index.len(), "corpus loaded");
        Ok(IndexHandle::persistent(corpus_id, index))
    }

    async fn list_corpora(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if tokio::fs::try_exists(path.join(INDEX_FILE))
                        .await
                        .unwrap_or(false)
                    {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read corpus directory entry");
                    break;
                }
            }
        }
        names.sort();
        names
    }

    async fn query(
        &self,
        index: &IndexHandle,
        text: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<RetrievalSnippet>, QueryError> {
        validate_query(top_k, similarity_threshold)?;
        if index.index().is_empty() || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .map_err(|e| QueryError::Embedding(e.to_string()))?;
        let query = vectors
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Embedding("embedder returned no vector".into()))?;

        Ok(index.index().search(&query, top_k, similarity_threshold))
    }

    async fn create_ephemeral(&self, text: &str) -> Result<IndexHandle, IngestError> {
        if text.trim().is_empty() {
            return Err(IngestError::EmptyInput("grounding text is empty".into()));
        }
        let index = self.build_index([("grounding", text)]).await?;
        info!(chunks = index.len(), "ephemeral index built");
        Ok(IndexHandle::ephemeral(index))
    }
}
