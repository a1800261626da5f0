mod app;
mod assistant;
mod error;
mod extract;
mod stocks;

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use stockrate_core::config::Settings;
use stockrate_core::ingest::bulk::BulkOptions;
use stockrate_core::ingest::provider::{HttpUpstreamClient, UpstreamClient};
use stockrate_core::llm::anthropic::AnthropicClient;
use stockrate_core::llm::LlmClient;
use stockrate_core::scoring::ScoringWeights;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // A bad weight override is a deployment mistake, not a degraded mode.
    let weights = ScoringWeights::from_env().context("invalid SCORING_WEIGHT_* configuration")?;

    let state = app::AppState {
        pool: connect_pool(&settings).await,
        upstream: upstream_client(&settings),
        llm: llm_client(&settings),
        weights,
        bulk: BulkOptions::from_env(),
    };
    tracing::info!(
        database = state.pool.is_some(),
        upstream = state.upstream.is_some(),
        llm = state.llm.is_some(),
        ?weights,
        "collaborators configured"
    );

    let app = app::app(state);

    let port = settings.port.unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_pool(settings: &Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    match stockrate_core::storage::migrate(&pool).await {
        Ok(()) => Some(pool),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
            None
        }
    }
}

fn upstream_client(settings: &Settings) -> Option<Arc<dyn UpstreamClient>> {
    match HttpUpstreamClient::from_settings(settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "upstream ratings API unavailable; ingestion routes disabled");
            None
        }
    }
}

fn llm_client(settings: &Settings) -> Option<Arc<dyn LlmClient>> {
    match AnthropicClient::from_settings(settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "LLM provider unavailable; summary and chat disabled");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
