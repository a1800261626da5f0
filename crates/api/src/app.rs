use crate::error::ApiError;
use crate::{assistant, stocks};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::any::Any;
use std::sync::Arc;
use stockrate_core::ingest::bulk::BulkOptions;
use stockrate_core::ingest::provider::UpstreamClient;
use stockrate_core::llm::LlmClient;
use stockrate_core::scoring::ScoringWeights;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Collaborators are optional: a missing one turns the routes that need it
/// into 503s instead of keeping the API from starting.
#[derive(Clone)]
pub struct AppState {
    pub pool: Option<PgPool>,
    pub upstream: Option<Arc<dyn UpstreamClient>>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub weights: ScoringWeights,
    pub bulk: BulkOptions,
}

impl AppState {
    pub fn pool(&self) -> Result<&PgPool, ApiError> {
        self.pool.as_ref().ok_or_else(|| ApiError::unavailable("database"))
    }

    pub fn upstream(&self) -> Result<&Arc<dyn UpstreamClient>, ApiError> {
        self.upstream
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("upstream ratings API"))
    }

    pub fn llm(&self) -> Result<&Arc<dyn LlmClient>, ApiError> {
        self.llm
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("LLM provider"))
    }
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/stocks", post(stocks::fetch_page))
        .route("/stocks/bulk", post(stocks::bulk_ingest))
        .route("/stocks/list", post(stocks::list))
        .route("/stocks/search", post(stocks::search))
        .route("/stocks/actions", get(stocks::actions))
        .route("/stocks/filter-options", get(stocks::filter_options))
        .route("/stocks/recommendations", get(stocks::recommendations))
        .route("/stocks/metrics", get(stocks::metrics))
        .route("/stocks/summary", get(assistant::summary))
        .route("/stocks/chat", post(assistant::chat));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}
