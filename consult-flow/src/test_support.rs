//! Deterministic fakes shared by the unit tests.

use async_trait::async_trait;
use rig::completion::CompletionError;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::backend::{ChatBackend, ChatMessage, ChatReply, ChatRequest};
use crate::config::ModelConfig;
use crate::error::{BackendError, IngestError, QueryError};
use crate::retrieval::{
    Document, Embedder, EmbeddingError, IndexHandle, RetrievalContract, RetrievalSnippet,
    VectorIndex,
};

pub fn test_model() -> ModelConfig {
    ModelConfig::new("https://llm.test/v1", "sk-test")
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub user: String,
    pub tools: Vec<String>,
}

enum Scripted {
    Reply(ChatReply),
    Fail(String),
}

/// Replays queued replies in call order and records every request it receives.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers `text` whenever the script is empty.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::new()
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_reply(ChatReply::text(text));
    }

    pub fn push_reply(&self, reply: ChatReply) {
        self.script.lock().unwrap().push_back(Scripted::Reply(reply));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.into()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        _model: &ModelConfig,
        request: ChatRequest<'_>,
    ) -> Result<ChatReply, BackendError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system.to_string(),
            history: request.history.to_vec(),
            user: request.user.to_string(),
            tools: request.tools.iter().map(|t| t.name()).collect(),
        });

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(message)) => Err(CompletionError::ProviderError(message).into()),
            None => match &self.fallback {
                Some(text) => Ok(ChatReply::text(text.clone())),
                None => Err(BackendError::InvalidResponse("script exhausted".into())),
            },
        }
    }
}

/// Retrieval that ignores the index and answers every query with canned snippets or an error.
#[derive(Default)]
pub struct StaticRetrieval {
    snippets: Vec<RetrievalSnippet>,
    failure: Option<String>,
    queries: Mutex<Vec<(String, usize, f32)>>,
}

impl StaticRetrieval {
    pub fn with_snippets(snippets: Vec<RetrievalSnippet>) -> Self {
        Self {
            snippets,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, usize, f32)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalContract for StaticRetrieval {
    async fn ingest(
        &self,
        corpus_id: &str,
        documents: Vec<Document>,
    ) -> Result<IndexHandle, IngestError> {
        if documents.is_empty() {
            return Err(IngestError::EmptyInput("no documents supplied".into()));
        }
        Ok(IndexHandle::persistent(corpus_id, VectorIndex::default()))
    }

    async fn open(&self, corpus_id: &str) -> Result<IndexHandle, IngestError> {
        Ok(IndexHandle::persistent(corpus_id, VectorIndex::default()))
    }

    async fn list_corpora(&self) -> Vec<String> {
        Vec::new()
    }

    async fn query(
        &self,
        _index: &IndexHandle,
        text: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<RetrievalSnippet>, QueryError> {
        self.queries
            .lock()
            .unwrap()
            .push((text.to_string(), top_k, similarity_threshold));
        match &self.failure {
            Some(message) => Err(QueryError::Embedding(message.clone())),
            None => Ok(self.snippets.clone()),
        }
    }

    async fn create_ephemeral(&self, text: &str) -> Result<IndexHandle, IngestError> {
        if text.trim().is_empty() {
            return Err(IngestError::EmptyInput("grounding text is empty".into()));
        }
        Ok(IndexHandle::ephemeral(VectorIndex::default()))
    }
}

const HASH_DIMENSIONS: usize = 64;

/// Bag-of-words embedder: identical texts embed identically, disjoint vocabularies mostly do not
/// overlap.
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; HASH_DIMENSIONS];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % HASH_DIMENSIONS] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// [`HashingEmbedder`] that also records the size of every batch.
#[derive(Default)]
pub struct RecordingEmbedder {
    batches: Mutex<Vec<usize>>,
}

impl RecordingEmbedder {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.lock().unwrap().push(texts.len());
        HashingEmbedder.embed(texts).await
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(rig::embeddings::EmbeddingError::ProviderError("quota exceeded".into()).into())
    }
}
