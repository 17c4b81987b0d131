use crate::{
    catalog::{MovieRecord, RankedResult, DEFAULT_SAMPLE_SIZE},
    commentary::AnnotatedResult,
    context::AppContext,
    errors::AppError,
    images::{PlaceholderBody, Poster},
    vocabulary::{FilterRequest, FilterVocabulary},
};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    ctx: Arc<AppContext>,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let shared_state = Arc::new(SharedState { ctx });

    Router::new()
        .route("/api/search/lexical", post(lexical_search))
        .route("/api/search/semantic", post(semantic_search))
        .route("/api/random", get(random))
        .route("/api/filters", get(filters))
        .route("/api/poster", get(poster))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutting down");
}

async fn start_app(ctx: Arc<AppContext>, addr: &str) -> anyhow::Result<()> {
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Serves the JSON API until interrupted.
///
/// `ctx` must be built before calling this; it holds blocking clients that
/// cannot be created inside the runtime.
pub fn start_daemon(ctx: AppContext, addr: &str) -> anyhow::Result<()> {
    let ctx = Arc::new(ctx);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(ctx, addr))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SemanticDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Backend(err) if err.is_unavailable() => {
                log::warn!("{err}");
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Backend(err) => {
                log::error!("{err}");
                StatusCode::BAD_GATEWAY
            }
            AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Runs blocking work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, HttpError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Other(anyhow::anyhow!("worker task failed: {e}")))?
        .map_err(HttpError)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LexicalSearchRequest {
    pub query: String,
    pub top_n: Option<usize>,
}

async fn lexical_search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<LexicalSearchRequest>,
) -> Result<Json<Vec<RankedResult>>, HttpError> {
    log::debug!("payload: {payload:?}");
    let ctx = state.ctx.clone();

    blocking(move || Ok(ctx.lexical_search(&payload.query, payload.top_n)))
        .await
        .map(Json)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    pub k: Option<usize>,
    #[serde(default)]
    pub filters: FilterRequest,
    /// Ask the commentary model about every result
    #[serde(default)]
    pub commentary: bool,
}

async fn semantic_search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SemanticSearchRequest>,
) -> Result<Json<Vec<AnnotatedResult>>, HttpError> {
    log::debug!("payload: {payload:?}");
    let ctx = state.ctx.clone();

    blocking(move || {
        ctx.semantic_search(
            &payload.query,
            payload.filters,
            payload.k,
            payload.commentary,
        )
    })
    .await
    .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct RandomParams {
    pub count: Option<usize>,
}

async fn random(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<RandomParams>,
) -> Json<Vec<MovieRecord>> {
    Json(state.ctx.random(params.count.unwrap_or(DEFAULT_SAMPLE_SIZE)))
}

async fn filters(State(state): State<Arc<SharedState>>) -> Json<FilterVocabulary> {
    Json(state.ctx.vocabulary().clone())
}

#[derive(Debug, Deserialize)]
pub struct PosterParams {
    pub url: String,
}

async fn poster(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<PosterParams>,
) -> Result<axum::response::Response, HttpError> {
    let ctx = state.ctx.clone();
    let poster = blocking(move || Ok(ctx.poster(&params.url))).await?;

    Ok(match poster {
        Poster::Image { data, mime, .. } => {
            ([(header::CONTENT_TYPE, mime)], data).into_response()
        }
        Poster::Placeholder => {
            (StatusCode::NOT_FOUND, Json(PlaceholderBody::default())).into_response()
        }
    })
}
