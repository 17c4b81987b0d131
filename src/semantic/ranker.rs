use std::sync::Arc;

use crate::catalog::RankedResult;
use crate::config::ResilienceConfig;
use crate::filter::Predicate;
use crate::resilience::{BackendError, Failure, Guarded};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::store::VectorStore;

const EMBEDDING_BACKEND: &str = "embedding model";

/// Embeds the query and asks the vector store for its nearest movies.
pub struct SemanticRanker {
    embedder: Arc<dyn Embedder>,
    store: Box<dyn VectorStore>,
    guard: Guarded,
}

impl SemanticRanker {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Box<dyn VectorStore>,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            guard: Guarded::new(EMBEDDING_BACKEND, resilience),
        }
    }

    /// Up to `k` movies ordered by the store's similarity, each with its full
    /// metadata. An empty query or `k == 0` yields no results.
    pub fn search(
        &self,
        query: &str,
        filter: Option<&Predicate>,
        k: usize,
    ) -> Result<Vec<RankedResult>, BackendError> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let vector = self.guard.call(|| {
            self.embedder.embed(query).map_err(|err| match err {
                EmbeddingError::EmbeddingFailed(reason) => Failure::Retryable(reason),
                other => Failure::Terminal(other.to_string()),
            })
        })?;

        let hits = self.store.search(&vector, filter, k)?;
        log::debug!(
            "{} returned {} hits for {query:?} (filtered: {})",
            self.store.name(),
            hits.len(),
            filter.is_some()
        );

        Ok(hits
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(pos, hit)| RankedResult {
                movie: hit.movie,
                score: hit.score,
                rank: pos + 1,
                content: Some(hit.content).filter(|c| !c.is_empty()),
            })
            .collect())
    }
}
