use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::catalog::{Catalog, MovieRecord, RankedResult};
use crate::commentary::{annotate, AnnotatedResult, CommentaryClient, Commentator};
use crate::config::Config;
use crate::errors::AppError;
use crate::images::{Poster, PosterFetcher};
use crate::lexical::{IndexCache, IndexStatus, LexicalIndex};
use crate::semantic::qdrant::QDRANT_API_KEY_ENV;
use crate::semantic::{EmbeddingModel, QdrantStore, SemanticRanker};
use crate::storage::BackendLocal;
use crate::vocabulary::{FilterRequest, FilterVocabulary};

/// Which optional backends to bring up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextOptions {
    pub semantic: bool,
    pub commentary: bool,
    pub rebuild_index: bool,
}

/// Everything a query handler needs, built once at startup.
///
/// Blocking HTTP clients live in here, so the context must be built before
/// any async runtime starts.
pub struct AppContext {
    config: Config,
    catalog: Arc<Catalog>,
    vocabulary: FilterVocabulary,
    lexical: LexicalIndex,
    semantic: Option<SemanticRanker>,
    commentary: Option<Box<dyn Commentator>>,
    posters: PosterFetcher,
    /// Poster URLs the catalog knows about; nothing else is fetched
    poster_urls: HashSet<String>,
}

impl AppContext {
    pub fn load(config: Config, options: ContextOptions) -> anyhow::Result<Self> {
        let catalog = Arc::new(Catalog::load_or_empty(&config.catalog_file()));
        let vocabulary = FilterVocabulary::load_or_derive(&config.vocabulary_file(), &catalog);

        let lexical = match BackendLocal::new(config.cache_path()) {
            Ok(storage) => LexicalIndex::load_or_build(
                catalog.clone(),
                &config.lexical,
                &IndexCache::new(Box::new(storage)),
                options.rebuild_index,
            ),
            Err(err) => {
                log::warn!(
                    "Cache directory {} unusable ({err}), index will not be persisted",
                    config.cache_path().display()
                );
                LexicalIndex::fit(catalog.clone(), &config.lexical)
            }
        };

        let semantic = if options.semantic && config.semantic.enabled {
            match build_semantic(&config) {
                Ok(ranker) => Some(ranker),
                Err(err) => {
                    log::warn!("Semantic search disabled: {err:#}");
                    None
                }
            }
        } else {
            None
        };

        let commentary: Option<Box<dyn Commentator>> =
            if options.commentary && config.commentary.enabled {
                match CommentaryClient::from_env(&config.commentary, &config.resilience) {
                    Ok(client) => Some(Box::new(client)),
                    Err(err) => {
                        log::warn!("Commentary disabled: {err:#}");
                        None
                    }
                }
            } else {
                None
            };

        Self::from_parts(config, catalog, vocabulary, lexical, semantic, commentary)
    }

    pub fn from_parts(
        config: Config,
        catalog: Arc<Catalog>,
        vocabulary: FilterVocabulary,
        lexical: LexicalIndex,
        semantic: Option<SemanticRanker>,
        commentary: Option<Box<dyn Commentator>>,
    ) -> anyhow::Result<Self> {
        let posters = PosterFetcher::new(Duration::from_secs(config.images.timeout_secs))?;
        let poster_urls = catalog
            .movies()
            .iter()
            .filter_map(|movie| movie.poster_url())
            .map(str::to_string)
            .collect();
        Ok(Self {
            config,
            catalog,
            vocabulary,
            lexical,
            semantic,
            commentary,
            posters,
            poster_urls,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn vocabulary(&self) -> &FilterVocabulary {
        &self.vocabulary
    }

    pub fn index_status(&self) -> IndexStatus {
        self.lexical.status()
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn lexical_search(&self, query: &str, top_n: Option<usize>) -> Vec<RankedResult> {
        self.lexical
            .search(query, top_n.unwrap_or(self.config.lexical.top_n))
    }

    /// Semantic search with metadata filters and optional commentary.
    ///
    /// `k` defaults to the page size of the mode: the full result list, or
    /// the short list shown with commentary.
    pub fn semantic_search(
        &self,
        query: &str,
        filters: FilterRequest,
        k: Option<usize>,
        with_commentary: bool,
    ) -> Result<Vec<AnnotatedResult>, AppError> {
        let ranker = self.semantic.as_ref().ok_or(AppError::SemanticDisabled)?;
        let selection = self.vocabulary.resolve(filters).map_err(AppError::BadRequest)?;
        let predicate = selection.to_predicate();

        let k = k.unwrap_or(if with_commentary {
            self.config.commentary.top_k
        } else {
            self.config.semantic.top_k
        });

        let results = ranker.search(query, predicate.as_ref(), k)?;
        log::info!("semantic search {query:?}: {} results", results.len());

        let commentator = if with_commentary {
            if self.commentary.is_none() {
                log::warn!("Commentary requested but not configured");
            }
            self.commentary.as_deref()
        } else {
            None
        };

        Ok(annotate(results, query, commentator))
    }

    pub fn random(&self, count: usize) -> Vec<MovieRecord> {
        self.catalog.sample(count)
    }

    /// Poster for a catalog movie. URLs that no catalog movie carries get
    /// the placeholder without a request.
    pub fn poster(&self, url: &str) -> Poster {
        if !self.poster_urls.contains(url) {
            log::debug!("{url}: not a catalog poster");
            return Poster::Placeholder;
        }
        self.posters.fetch(url)
    }
}

fn build_semantic(config: &Config) -> anyhow::Result<SemanticRanker> {
    let embedder = EmbeddingModel::new(&config.semantic.model, config.base_path().to_path_buf())
        .context("failed to load embedding model")?;
    let api_key = std::env::var(QDRANT_API_KEY_ENV).ok().filter(|k| !k.is_empty());
    let store = QdrantStore::new(&config.semantic, &config.resilience, api_key)?;

    Ok(SemanticRanker::new(
        Arc::new(embedder),
        Box::new(store),
        &config.resilience,
    ))
}
