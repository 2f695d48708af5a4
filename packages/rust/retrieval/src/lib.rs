//! Candidate retrieval for PromptForge: prompt library loading, embedding
//! collaborators, the in-memory vector index, and the hybrid search that
//! turns an ambiguity report into enrichment candidates.

pub mod corpus;
pub mod embedding;
pub mod index;
pub mod search;

pub use corpus::{Corpus, CorpusEntry};
pub use embedding::{EmbeddingCache, EmbeddingProvider, HttpEmbeddingProvider, embed_cached};
pub use index::{InMemoryIndex, VectorIndex, try_embed_query};
pub use search::Retriever;
