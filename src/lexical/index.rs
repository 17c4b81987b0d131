use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::catalog::{Catalog, RankedResult};
use crate::config::LexicalConfig;
use crate::lexical::cache::{corpus_hash, hash_hex, CacheError, CorpusHash, IndexCache};
use crate::lexical::normalize::{build_corpus, prepare_query};
use crate::lexical::vectorizer::{cosine_similarity, CsrMatrix, TfidfVectorizer};

/// Where the fitted model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    Fitted,
    Cached,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub source: IndexSource,
    pub documents: usize,
    pub features: usize,
    pub nonzero: usize,
    pub corpus_hash: String,
}

/// TF-IDF index over the catalog, one matrix row per movie in catalog order.
///
/// Read-only once built.
pub struct LexicalIndex {
    catalog: Arc<Catalog>,
    vectorizer: TfidfVectorizer,
    matrix: CsrMatrix,
    corpus_hash: CorpusHash,
    source: IndexSource,
    threshold: f32,
    normalize_query: bool,
}

impl LexicalIndex {
    /// Fits a fresh index without touching any cache.
    pub fn fit(catalog: Arc<Catalog>, config: &LexicalConfig) -> Self {
        let documents = build_corpus(&catalog);
        let hash = corpus_hash(&documents);
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(&documents, config.max_features);
        Self::assemble(catalog, config, vectorizer, matrix, hash, IndexSource::Fitted)
    }

    /// Loads the cached index for this catalog, or fits and persists a new one.
    ///
    /// Persistence is best-effort: a failed write is logged and the freshly
    /// fitted index is still returned.
    pub fn load_or_build(
        catalog: Arc<Catalog>,
        config: &LexicalConfig,
        cache: &IndexCache,
        rebuild: bool,
    ) -> Self {
        let documents = build_corpus(&catalog);
        let hash = corpus_hash(&documents);
        let hex = hash_hex(&hash);

        if rebuild {
            log::info!("Rebuilding lexical index for corpus {hex}");
            if let Err(err) = cache.clear() {
                log::warn!("Failed to clear lexical cache: {err}");
            }
        } else {
            match cache.load(&hash, config.max_features) {
                Ok(cached) => {
                    log::info!(
                        "Loaded lexical index from cache ({} documents, {} terms, corpus {hex})",
                        cached.matrix.rows(),
                        cached.vectorizer.n_features()
                    );
                    return Self::assemble(
                        catalog,
                        config,
                        cached.vectorizer,
                        cached.matrix,
                        hash,
                        IndexSource::Cached,
                    );
                }
                Err(CacheError::Missing(ident)) => {
                    log::info!("Lexical cache miss ({ident} missing), fitting corpus {hex}");
                }
                Err(CacheError::Stale(reason)) => {
                    log::info!("Lexical cache is stale ({reason}), refitting corpus {hex}");
                }
                Err(err) => {
                    log::warn!("Lexical cache unreadable ({err}), refitting corpus {hex}");
                }
            }
        }

        let now = Instant::now();
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(&documents, config.max_features);
        log::debug!(
            "took {}ms to fit {} documents into {} terms",
            now.elapsed().as_micros() as f64 / 1000.0,
            matrix.rows(),
            vectorizer.n_features()
        );

        if let Err(err) = cache.save(&hash, &documents, &vectorizer, &matrix) {
            log::warn!("Failed to persist lexical index: {err}");
        }

        Self::assemble(catalog, config, vectorizer, matrix, hash, IndexSource::Fitted)
    }

    fn assemble(
        catalog: Arc<Catalog>,
        config: &LexicalConfig,
        vectorizer: TfidfVectorizer,
        matrix: CsrMatrix,
        corpus_hash: CorpusHash,
        source: IndexSource,
    ) -> Self {
        Self {
            catalog,
            vectorizer,
            matrix,
            corpus_hash,
            source,
            threshold: config.threshold,
            normalize_query: config.normalize_query,
        }
    }

    /// Similarity of `query` to every movie, in catalog order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let prepared = prepare_query(query, self.normalize_query);
        let query_vec = self.vectorizer.transform(&prepared);

        (0..self.matrix.rows())
            .map(|idx| {
                self.matrix
                    .row(idx)
                    .map(|row| cosine_similarity(query_vec.as_row(), row))
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Top `top_n` movies by cosine similarity, keeping only those scoring
    /// strictly above the threshold. Equal scores keep catalog order.
    pub fn search(&self, query: &str, top_n: usize) -> Vec<RankedResult> {
        if query.trim().is_empty() || top_n == 0 {
            return vec![];
        }

        let mut scored: Vec<(usize, f32)> = self.scores(query).into_iter().enumerate().collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(top_n)
            .filter(|(_, score)| *score > self.threshold)
            .filter_map(|(idx, score)| self.catalog.get(idx).map(|movie| (movie, score)))
            .enumerate()
            .map(|(pos, (movie, score))| RankedResult {
                movie: movie.clone(),
                score,
                rank: pos + 1,
                content: None,
            })
            .collect()
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            source: self.source,
            documents: self.matrix.rows(),
            features: self.vectorizer.n_features(),
            nonzero: self.matrix.nnz(),
            corpus_hash: hash_hex(&self.corpus_hash),
        }
    }
}
