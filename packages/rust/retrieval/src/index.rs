//! In-memory cosine-similarity vector index.

use tracing::{debug, warn};

use promptforge_shared::CollaboratorResult;

use crate::corpus::Corpus;
use crate::embedding::{EmbeddingCache, EmbeddingProvider, embed_cached};

// ---------------------------------------------------------------------------
// VectorIndex trait
// ---------------------------------------------------------------------------

/// Similarity search over corpus embeddings. The retriever treats an index
/// that is not ready, or holds zero vectors, as unavailable and falls back
/// to lexical scoring.
pub trait VectorIndex: Send + Sync {
    fn is_ready(&self) -> bool;
    fn count(&self) -> usize;
    /// Top `limit` entries by cosine similarity, best first, as
    /// `(prompt_id, score)` pairs.
    fn search(&self, query: &[f32], limit: usize) -> Vec<(String, f32)>;
}

// ---------------------------------------------------------------------------
// InMemoryIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    vectors: Vec<(String, Vec<f32>)>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prompt_id: String, vector: Vec<f32>) {
        self.vectors.push((prompt_id, vector));
    }

    /// Embed every corpus entry and build the index. Entries that fail to
    /// embed in the batch propagate as one collaborator error; the caller
    /// decides whether to run without an index.
    pub async fn build(
        corpus: &Corpus,
        provider: &dyn EmbeddingProvider,
        cache: &EmbeddingCache,
    ) -> CollaboratorResult<Self> {
        let mut index = Self::new();

        // Resolve cache hits first, then batch-embed only the misses.
        let partition = provider.partition();
        let mut misses: Vec<(usize, String)> = Vec::new();
        let entries = corpus.entries();
        for (i, entry) in entries.iter().enumerate() {
            match cache.get(&partition, &entry.content) {
                Some(vector) => index.insert(entry.id.clone(), vector),
                None => misses.push((i, entry.content.clone())),
            }
        }

        if !misses.is_empty() {
            let texts: Vec<String> = misses.iter().map(|(_, t)| t.clone()).collect();
            let vectors = provider.embed_batch(&texts).await?;
            for ((i, text), vector) in misses.into_iter().zip(vectors) {
                cache.put(&partition, &text, vector.clone());
                index.insert(entries[i].id.clone(), vector);
            }
        }

        debug!(count = index.count(), "vector index built");
        Ok(index)
    }
}

impl VectorIndex for InMemoryIndex {
    fn is_ready(&self) -> bool {
        !self.vectors.is_empty()
    }

    fn count(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Cosine similarity; 0.0 for mismatched dimensions or zero vectors.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        warn!(left = a.len(), right = b.len(), "dimension mismatch in similarity");
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ---------------------------------------------------------------------------
// Query-side embedding with fallback signal
// ---------------------------------------------------------------------------

/// Embed a query for index search, returning `None` (after logging) when the
/// provider fails, so the caller can fall back to lexical scoring.
pub async fn try_embed_query(
    provider: &dyn EmbeddingProvider,
    cache: &EmbeddingCache,
    query: &str,
) -> Option<Vec<f32>> {
    match embed_cached(provider, cache, query).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(service = e.service(), error = %e, "query embedding failed, falling back to lexical");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use promptforge_shared::CollaboratorError;

    use crate::corpus::CorpusEntry;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_mismatch_and_zero() {
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn empty_index_is_not_ready() {
        let index = InMemoryIndex::new();
        assert!(!index.is_ready());
        assert_eq!(index.count(), 0);
        assert!(index.search(&[1.0], 5).is_empty());
    }

    #[test]
    fn search_returns_best_first() {
        let mut index = InMemoryIndex::new();
        index.insert("far".into(), vec![0.0, 1.0]);
        index.insert("near".into(), vec![1.0, 0.1]);
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, "near");
        assert!(hits[0].1 > hits[1].1);
    }

    struct WordLen;

    #[async_trait]
    impl EmbeddingProvider for WordLen {
        fn partition(&self) -> String {
            "wordlen#v1".into()
        }
        async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
            Ok(vec![text.split_whitespace().count() as f32, 1.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    struct Failing;

    #[async_trait]
    impl EmbeddingProvider for Failing {
        fn partition(&self) -> String {
            "failing#v1".into()
        }
        async fn embed(&self, _text: &str) -> CollaboratorResult<Vec<f32>> {
            Err(CollaboratorError::unavailable("embeddings", "down"))
        }
        async fn embed_batch(&self, _texts: &[String]) -> CollaboratorResult<Vec<Vec<f32>>> {
            Err(CollaboratorError::unavailable("embeddings", "down"))
        }
    }

    fn corpus() -> Corpus {
        Corpus::from_entries(vec![
            CorpusEntry {
                id: "p1".into(),
                name: "one".into(),
                content: "short".into(),
                category: String::new(),
                tags: vec![],
            },
            CorpusEntry {
                id: "p2".into(),
                name: "two".into(),
                content: "a longer entry body".into(),
                category: String::new(),
                tags: vec![],
            },
        ])
    }

    #[tokio::test]
    async fn build_embeds_all_entries_and_warms_cache() {
        let cache = EmbeddingCache::new();
        let index = InMemoryIndex::build(&corpus(), &WordLen, &cache).await.unwrap();
        assert!(index.is_ready());
        assert_eq!(index.count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn build_propagates_provider_failure() {
        let cache = EmbeddingCache::new();
        let result = InMemoryIndex::build(&corpus(), &Failing, &cache).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn query_fallback_signals_none() {
        let cache = EmbeddingCache::new();
        assert!(try_embed_query(&Failing, &cache, "q").await.is_none());
        assert!(try_embed_query(&WordLen, &cache, "q").await.is_some());
    }
}
