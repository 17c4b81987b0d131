//! Qdrant REST client for the movie collection.
//!
//! Points were indexed with the embedded text under `page_content` and the
//! movie fields under `metadata`, which is why filter keys are prefixed with
//! `metadata.`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::MovieRecord;
use crate::config::{ResilienceConfig, SemanticConfig};
use crate::filter::Predicate;
use crate::resilience::{BackendError, Failure, Guarded};
use crate::semantic::store::{StoredHit, VectorStore};

pub const QDRANT_API_KEY_ENV: &str = "CINESEEK_QDRANT_API_KEY";

const BACKEND: &str = "vector index";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Predicate>,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct PointPayload {
    #[serde(default)]
    page_content: String,
    #[serde(default)]
    metadata: MovieRecord,
}

impl From<ScoredPoint> for StoredHit {
    fn from(point: ScoredPoint) -> Self {
        let payload = point.payload.unwrap_or_default();
        StoredHit {
            movie: payload.metadata,
            content: payload.page_content,
            score: point.score,
        }
    }
}

pub struct QdrantStore {
    client: reqwest::blocking::Client,
    search_url: String,
    api_key: Option<String>,
    guard: Guarded,
}

impl QdrantStore {
    pub fn new(
        config: &SemanticConfig,
        resilience: &ResilienceConfig,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            search_url: format!(
                "{}/collections/{}/points/search",
                config.qdrant_url.trim_end_matches('/'),
                config.collection
            ),
            api_key,
            guard: Guarded::new(BACKEND, resilience),
        })
    }

    fn search_once(&self, request: &SearchRequest<'_>) -> Result<Vec<StoredHit>, Failure> {
        let mut builder = self.client.post(&self.search_url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }

        let response = builder.send().map_err(|e| Failure::from_reqwest(&e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Failure::from_status(status, &detail));
        }

        let parsed: SearchResponse = response
            .json()
            .map_err(|e| Failure::Terminal(format!("malformed search response: {e}")))?;

        Ok(parsed.result.into_iter().map(StoredHit::from).collect())
    }
}

impl VectorStore for QdrantStore {
    fn search(
        &self,
        vector: &[f32],
        filter: Option<&Predicate>,
        limit: usize,
    ) -> Result<Vec<StoredHit>, BackendError> {
        let request = SearchRequest {
            vector,
            limit,
            filter,
            with_payload: true,
        };
        self.guard.call(|| self.search_once(&request))
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}
