//! Semantic search over the external vector index.
//!
//! - `embeddings`: fastembed-backed query embedding
//! - `store`: vector store boundary and an in-memory implementation
//! - `qdrant`: Qdrant REST client
//! - `ranker`: query text in, ranked movies out

pub mod embeddings;
pub mod qdrant;
pub mod ranker;
pub mod store;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use qdrant::QdrantStore;
pub use ranker::SemanticRanker;
pub use store::{MemoryVectorStore, StoredHit, VectorStore};
