use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::RetrievalSnippet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Flat cosine-similarity index over embedded chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(chunks: Vec<IndexedChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Best-first hits scoring at least `threshold`, capped at `top_k`.
    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<RetrievalSnippet> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (similarity(query, &chunk.embedding), chunk))
            .filter(|(score, _)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, chunk)| RetrievalSnippet::new(chunk.text.clone(), score))
            .collect()
    }
}

/// Cosine similarity clamped into [0, 1]. Mismatched or zero vectors score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            source: "test".into(),
            text: text.into(),
            embedding,
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::new(vec![
            chunk("east", vec![1.0, 0.0]),
            chunk("north-east", vec![1.0, 1.0]),
            chunk("north", vec![0.0, 1.0]),
            chunk("west", vec![-1.0, 0.0]),
        ])
    }

    #[test]
    fn test_similarity_bounds() {
        assert!((similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_best_first() {
        let hits = index().search(&[1.0, 0.2], 4, 0.0);
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts[0], "east");
        assert_eq!(texts[1], "north-east");
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_search_respects_top_k_and_threshold() {
        assert_eq!(index().search(&[1.0, 0.0], 1, 0.0).len(), 1);
        let hits = index().search(&[1.0, 0.0], 10, 0.9);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "east");
        assert!(index().search(&[0.0, -1.0], 3, 0.5).is_empty());
    }
}
