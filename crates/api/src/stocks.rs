use crate::app::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockrate_core::domain::metrics::StockMetrics;
use stockrate_core::domain::rating::RatingEvent;
use stockrate_core::domain::recommendation::ScoredRecommendation;
use stockrate_core::error::InvalidInput;
use stockrate_core::ingest::bulk::{run_bulk_ingest, BulkReport, PageRange};
use stockrate_core::ingest::{ingest_single_page, SinglePageResult};
use stockrate_core::query::{ListRequest, Page, PageMeta, SearchRequest};
use stockrate_core::scoring;
use stockrate_core::storage::metrics::stock_metrics;
use stockrate_core::storage::ratings::{self, FilterColumn, PgRatingSink};

pub const DEFAULT_RECOMMENDATION_LIMIT: i64 = 10;
pub const MAX_RECOMMENDATION_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct FetchPageBody {
    pub page: i64,
}

pub async fn fetch_page(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<FetchPageBody>,
) -> Result<Json<SinglePageResult>, ApiError> {
    let page = u32::try_from(body.page)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| InvalidInput::new("page", format!("must be >= 1 (got {})", body.page)))?;

    let pool = state.pool()?;
    let upstream = state.upstream()?;

    let sink = PgRatingSink::new(pool.clone());
    let res = ingest_single_page(upstream.as_ref(), &sink, page).await?;
    Ok(Json(res))
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub start_page: i64,
    pub end_page: i64,
}

pub async fn bulk_ingest(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<BulkBody>,
) -> Result<Json<BulkReport>, ApiError> {
    let range = PageRange::new(body.start_page, body.end_page, state.bulk.max_span)?;

    let pool = state.pool()?;
    let upstream = state.upstream()?;

    let sink = PgRatingSink::new(pool.clone());
    let report = run_bulk_ingest(Arc::clone(upstream), &sink, range, state.bulk).await?;
    tracing::info!(
        start_page = report.start_page,
        end_page = report.end_page,
        inserted = report.inserted,
        total = report.total_in_store,
        "bulk ingestion finished"
    );
    Ok(Json(report))
}

pub async fn list(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ListRequest>,
) -> Result<Json<Page<RatingEvent>>, ApiError> {
    let req = body.validate()?;
    let pool = state.pool()?;

    let (items, total) = ratings::query_page(pool, req.offset(), req.limit()).await?;
    Ok(Json(Page {
        items,
        pagination: PageMeta::new(req, total),
    }))
}

pub async fn search(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SearchRequest>,
) -> Result<Json<Page<RatingEvent>>, ApiError> {
    let (req, filter) = body.validate()?;
    let pool = state.pool()?;

    let (items, total) = ratings::query_filtered(pool, &filter, req.offset(), req.limit()).await?;
    Ok(Json(Page {
        items,
        pagination: PageMeta::new(req, total),
    }))
}

#[derive(Debug, Serialize)]
pub struct ActionsResponse {
    pub actions: Vec<String>,
}

pub async fn actions(State(state): State<AppState>) -> Result<Json<ActionsResponse>, ApiError> {
    let pool = state.pool()?;
    let actions = ratings::distinct_values(pool, FilterColumn::Action).await?;
    Ok(Json(ActionsResponse { actions }))
}

#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub actions: Vec<String>,
    pub rating_from: Vec<String>,
    pub rating_to: Vec<String>,
    pub brokerages: Vec<String>,
}

pub async fn filter_options(
    State(state): State<AppState>,
) -> Result<Json<FilterOptions>, ApiError> {
    let pool = state.pool()?;
    let (actions, rating_from, rating_to, brokerages) = tokio::try_join!(
        ratings::distinct_values(pool, FilterColumn::Action),
        ratings::distinct_values(pool, FilterColumn::RatingFrom),
        ratings::distinct_values(pool, FilterColumn::RatingTo),
        ratings::distinct_values(pool, FilterColumn::Brokerage),
    )?;
    Ok(Json(FilterOptions {
        actions,
        rating_from,
        rating_to,
        brokerages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<i64>,
}

impl RecommendationsQuery {
    fn limit(&self) -> Result<usize, InvalidInput> {
        let limit = self.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
        if !(1..=MAX_RECOMMENDATION_LIMIT).contains(&limit) {
            return Err(InvalidInput::new(
                "limit",
                format!("must be between 1 and {MAX_RECOMMENDATION_LIMIT} (got {limit})"),
            ));
        }
        Ok(limit as usize)
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<ScoredRecommendation>,
    pub count: usize,
    pub generated_at: DateTime<Utc>,
}

pub async fn recommendations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RecommendationsQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let limit = query.limit()?;
    let pool = state.pool()?;

    let events = ratings::all_events(pool).await?;
    let now = Utc::now();
    let recommendations = scoring::recommend(&events, &state.weights, now, limit);
    tracing::debug!(
        events = events.len(),
        returned = recommendations.len(),
        limit,
        "scored recommendations"
    );

    Ok(Json(RecommendationsResponse {
        count: recommendations.len(),
        recommendations,
        generated_at: now,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<StockMetrics>, ApiError> {
    let pool = state.pool()?;
    let metrics = stock_metrics(pool, Utc::now()).await?;
    Ok(Json(metrics))
}
