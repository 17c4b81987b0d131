//! Vector index boundary.
//!
//! A store receives a query vector, an optional metadata predicate and a
//! result count, and returns the nearest documents with their full movie
//! metadata. The production store is Qdrant; [`MemoryVectorStore`] keeps
//! everything in process and applies the same predicate semantics.

use crate::catalog::MovieRecord;
use crate::filter::Predicate;
use crate::resilience::BackendError;

/// One hit from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub movie: MovieRecord,
    /// Text that was embedded for this document
    pub content: String,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    /// Up to `limit` hits ordered by descending similarity.
    fn search(
        &self,
        vector: &[f32],
        filter: Option<&Predicate>,
        limit: usize,
    ) -> Result<Vec<StoredHit>, BackendError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot index zero-norm vector")]
    ZeroNormVector,
}

#[derive(Debug, Clone)]
struct VectorEntry {
    movie: MovieRecord,
    content: String,
    embedding: Vec<f32>,
}

/// In-memory vector store with cosine similarity search.
pub struct MemoryVectorStore {
    entries: Vec<VectorEntry>,
    dimensions: usize,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: vec![],
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a document. Returns an error if the embedding has the wrong
    /// length or zero norm.
    pub fn insert(
        &mut self,
        movie: MovieRecord,
        content: String,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.push(VectorEntry {
            movie,
            content,
            embedding,
        });
        Ok(())
    }
}

impl VectorStore for MemoryVectorStore {
    fn search(
        &self,
        vector: &[f32],
        filter: Option<&Predicate>,
        limit: usize,
    ) -> Result<Vec<StoredHit>, BackendError> {
        if vector.len() != self.dimensions {
            return Err(BackendError::Rejected {
                backend: self.name(),
                reason: IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    got: vector.len(),
                }
                .to_string(),
            });
        }

        let query_norm = l2_norm(vector);
        if query_norm < f32::EPSILON {
            return Ok(vec![]);
        }

        let mut hits: Vec<StoredHit> = self
            .entries
            .iter()
            .filter(|entry| filter.map(|p| p.matches(&entry.movie)).unwrap_or(true))
            .map(|entry| StoredHit {
                movie: entry.movie.clone(),
                content: entry.content.clone(),
                score: cosine_similarity(vector, &entry.embedding, query_norm),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "memory vector store"
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / (query_norm * target_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Bounds, FilterSelection};

    fn movie(title: &str, genre: &str, year: i32) -> MovieRecord {
        MovieRecord {
            title: title.into(),
            genre: vec![genre.into()],
            year: Some(year),
            ..Default::default()
        }
    }

    fn store() -> MemoryVectorStore {
        let mut store = MemoryVectorStore::new(3);
        store
            .insert(movie("Heat", "Crime", 1995), "heat".into(), vec![1.0, 0.0, 0.0])
            .unwrap();
        store
            .insert(movie("Up", "Animation", 2009), "up".into(), vec![0.0, 1.0, 0.0])
            .unwrap();
        store
            .insert(movie("Thief", "Crime", 1981), "thief".into(), vec![0.8, 0.6, 0.0])
            .unwrap();
        store
    }

    #[test]
    fn test_insert_validates() {
        let mut store = MemoryVectorStore::new(3);
        assert!(matches!(
            store.insert(MovieRecord::default(), String::new(), vec![1.0]),
            Err(IndexError::DimensionMismatch { expected: 3, got: 1 })
        ));
        assert!(matches!(
            store.insert(MovieRecord::default(), String::new(), vec![0.0; 3]),
            Err(IndexError::ZeroNormVector)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let hits = store().search(&[1.0, 0.0, 0.0], None, 10).unwrap();
        let titles: Vec<_> = hits.iter().map(|h| h.movie.title.as_str()).collect();
        assert_eq!(titles, vec!["Heat", "Thief", "Up"]);
        assert!((hits[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_search_applies_predicate_and_limit() {
        let predicate = FilterSelection {
            years: Some(Bounds::new(1990, 2010)),
            ..Default::default()
        }
        .to_predicate()
        .unwrap();

        let hits = store()
            .search(&[1.0, 0.0, 0.0], Some(&predicate), 1)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].movie.title, "Heat");
    }

    #[test]
    fn test_search_rejects_wrong_dimensions() {
        let result = store().search(&[1.0, 0.0], None, 10);
        assert!(matches!(result, Err(BackendError::Rejected { .. })));
    }
}
