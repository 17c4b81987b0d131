//! Cross-module scenarios.

mod filter;
mod web;

use std::sync::Arc;

use crate::catalog::{Catalog, MovieRecord};
use crate::config::{Config, ResilienceConfig};
use crate::context::AppContext;
use crate::lexical::LexicalIndex;
use crate::semantic::{Embedder, EmbeddingError, MemoryVectorStore, SemanticRanker};
use crate::vocabulary::FilterVocabulary;

pub(crate) fn movie(title: &str, genre: &str, year: i32, description: &str) -> MovieRecord {
    MovieRecord {
        title: title.to_string(),
        year: Some(year),
        genre: vec![genre.to_string()],
        description: description.to_string(),
        rating: Some(7.0),
        ..Default::default()
    }
}

/// The three-movie catalog used across scenarios.
pub(crate) fn sample_movies() -> Vec<MovieRecord> {
    vec![
        movie("Alpha", "Drama", 1995, "a detective investigates a murder"),
        movie("Beta", "Comedy", 2005, "a detective solves a comedic mystery"),
        movie("Gamma", "Action", 2015, "a detective battles villains"),
    ]
}

const KEYWORDS: [&str; 5] = ["murder", "comedic", "mystery", "battles", "villains"];

/// Embeds text as keyword counts, plus a constant so no vector is zero.
pub(crate) struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| text.matches(k).count() as f32)
            .collect();
        vector.push(0.05);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }
}

pub(crate) fn memory_store(movies: &[MovieRecord]) -> MemoryVectorStore {
    let embedder = KeywordEmbedder;
    let mut store = MemoryVectorStore::new(embedder.dimensions());
    for movie in movies {
        let content = format!("{}. {}", movie.title, movie.description);
        let embedding = embedder.embed(&content).unwrap();
        store.insert(movie.clone(), content, embedding).unwrap();
    }
    store
}

pub(crate) fn quick_resilience() -> ResilienceConfig {
    ResilienceConfig {
        max_attempts: 1,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        ..Default::default()
    }
}

/// Context over the sample catalog, with an in-memory semantic backend
/// when `semantic` is set.
pub(crate) fn sample_context(semantic: bool) -> AppContext {
    context_with(sample_movies(), semantic)
}

pub(crate) fn context_with(movies: Vec<MovieRecord>, semantic: bool) -> AppContext {
    let config = Config::default().with_base_path(std::env::temp_dir());
    let catalog = Arc::new(Catalog::new(movies.clone()));
    let vocabulary = FilterVocabulary::from_catalog(&catalog);
    let lexical = LexicalIndex::fit(catalog.clone(), &config.lexical);

    let ranker = semantic.then(|| {
        SemanticRanker::new(
            Arc::new(KeywordEmbedder),
            Box::new(memory_store(&movies)),
            &quick_resilience(),
        )
    });

    AppContext::from_parts(config, catalog, vocabulary, lexical, ranker, None).unwrap()
}
