pub mod bulk;
pub mod provider;
pub mod types;

use crate::domain::rating::NewRatingEvent;
use anyhow::Context;
use provider::UpstreamClient;
use serde::Serialize;
use types::UpstreamItem;

/// Write side of the rating store, as seen by ingestion.
#[async_trait::async_trait]
pub trait RatingSink: Send + Sync {
    async fn clear_all(&self) -> anyhow::Result<u64>;

    async fn insert_if_absent(&self, event: &NewRatingEvent) -> anyhow::Result<bool>;

    /// All-or-nothing: on error none of `events` is stored.
    async fn insert_batch(&self, events: &[NewRatingEvent]) -> anyhow::Result<u64>;

    async fn count(&self) -> anyhow::Result<i64>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SinglePageResult {
    pub page: u32,
    pub items: Vec<UpstreamItem>,
    pub next_page: String,
    pub inserted: u64,
}

/// Upstream answered a single-page fetch with a non-2xx status.
#[derive(Debug, Clone)]
pub struct UpstreamStatusError {
    pub page: u32,
    pub status: u16,
}

impl std::fmt::Display for UpstreamStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream returned HTTP {} for page {}", self.status, self.page)
    }
}

impl std::error::Error for UpstreamStatusError {}

/// Transport or decode failure while fetching a single page.
#[derive(Debug)]
pub struct UpstreamFetchError {
    pub page: u32,
    pub source: anyhow::Error,
}

impl std::fmt::Display for UpstreamFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetching upstream page {} failed: {:#}", self.page, self.source)
    }
}

impl std::error::Error for UpstreamFetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Fetches exactly `page` (no offset retries) and stores its items one by one.
pub async fn ingest_single_page(
    upstream: &dyn UpstreamClient,
    sink: &dyn RatingSink,
    page: u32,
) -> anyhow::Result<SinglePageResult> {
    let fetched = upstream
        .fetch_page(page)
        .await
        .map_err(|source| UpstreamFetchError { page, source })?;
    if !fetched.is_success() {
        return Err(UpstreamStatusError {
            page,
            status: fetched.status,
        }
        .into());
    }

    let mut inserted: u64 = 0;
    for event in fetched.events() {
        if sink
            .insert_if_absent(&event)
            .await
            .with_context(|| format!("store item from page {page} failed"))?
        {
            inserted += 1;
        }
    }

    tracing::info!(
        page,
        items = fetched.items.len(),
        inserted,
        provider = upstream.provider_name(),
        "ingested single upstream page"
    );

    Ok(SinglePageResult {
        page,
        items: fetched.items,
        next_page: fetched.next_page,
        inserted,
    })
}
