use async_trait::async_trait;
use rig::client::EmbeddingsClient;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::openai;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;

/// Number of inputs per embedding request. Providers such as DashScope reject larger batches.
pub const EMBED_BATCH_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding client setup failed: {0}")]
    Client(String),

    #[error(transparent)]
    Provider(#[from] rig::embeddings::EmbeddingError),

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embeds `texts` in consecutive batches of [`EMBED_BATCH_SIZE`].
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
        debug!(batch = batch_no, size = batch.len(), "embedding batch");
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: embedded.len(),
            });
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// Embedder for OpenAI-compatible `/embeddings` endpoints, via rig's OpenAI provider.
pub struct OpenAiCompatibleEmbedder {
    model: openai::EmbeddingModel,
}

impl OpenAiCompatibleEmbedder {
    /// Reuses the chat connection's endpoint and credential with a dedicated embedding model.
    pub fn new(connection: ModelConfig, model: impl Into<String>) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EmbeddingError::Client(e.to_string()))?;
        let client = openai::Client::builder(&connection.api_key)
            .base_url(connection.endpoint())
            .custom_client(http)
            .build()
            .map_err(|e| EmbeddingError::Client(e.to_string()))?;
        Ok(Self {
            model: client.embedding_model(&model.into()),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.model.embed_texts(texts.to_vec()).await?;
        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|x| x as f32).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingEmbedder {
        batch_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.batch_sizes.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_batches_are_exactly_ten() {
        let embedder = CountingEmbedder {
            batch_sizes: Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = (0..23).map(|i| format!("chunk {i}")).collect();

        let vectors = embed_in_batches(&embedder, &texts).await.unwrap();

        assert_eq!(vectors.len(), 23);
        assert_eq!(*embedder.batch_sizes.lock().unwrap(), vec![10, 10, 3]);
        assert_eq!(vectors[22], vec!["chunk 22".len() as f32]);
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_is_an_error() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = embed_in_batches(&ShortEmbedder, &texts).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
