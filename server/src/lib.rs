use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use search_core::{IndexPaths, QueryEngine, Ranking, SearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}
fn default_page() -> i64 { 1 }
fn default_per_page() -> usize { DEFAULT_PER_PAGE }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub page: usize,
    pub per_page: usize,
    pub total_results: usize,
    pub elapsed_ms: f64,
    pub results: Vec<SearchResult>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: u32,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

pub fn build_app(index_dir: &str, ranking: Ranking, shard_cache: usize) -> Result<Router> {
    let engine = QueryEngine::open(IndexPaths::new(index_dir), shard_cache)?.with_ranking(ranking);
    tracing::info!(index_dir, ?ranking, shard_cache, documents = engine.documents().len(), "index loaded");
    let app_state = AppState { engine: Arc::new(engine) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

/// One page of `results`, 1-based. Pages past the end are empty.
pub fn paginate<T>(results: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    results.into_iter().skip(page.saturating_sub(1).saturating_mul(per_page)).take(per_page).collect()
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = Instant::now();
    let query = match params.q {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err((StatusCode::BAD_REQUEST, "Missing query parameter 'q'".to_string())),
    };
    let page = params.page.max(1) as usize;
    let per_page = params.per_page.clamp(1, MAX_PER_PAGE);

    let engine = Arc::clone(&state.engine);
    let text = query.clone();
    let ranked = tokio::task::spawn_blocking(move || engine.search(&text))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            tracing::error!(%query, error = %e, "search failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        })?;

    let total_results = ranked.len();
    let results = paginate(ranked, page, per_page);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!(%query, total_results, elapsed_ms, "search served");
    Ok(Json(SearchResponse { query, page, per_page, total_results, elapsed_ms, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<DocResponse>, (StatusCode, String)> {
    match state.engine.documents().get(doc_id) {
        Some(record) => Ok(Json(DocResponse {
            doc_id,
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
        })),
        None => Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found"))),
    }
}
