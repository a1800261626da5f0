//! Bulk re-ingestion of an inclusive page range.
//!
//! One task per page is spawned and admitted through a semaphore; every task
//! reports into a single bounded channel drained by one consumer, which batches
//! events and flushes them to the sink one transaction at a time. The first
//! task error aborts the job (see [`BulkAborted`]); batches flushed before that
//! point stay written.

use crate::domain::rating::NewRatingEvent;
use crate::error::InvalidInput;
use crate::ingest::provider::UpstreamClient;
use crate::ingest::RatingSink;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_PAGE_RETRIES: u32 = 3;
/// Upstream page numbers are sparse; empty pages are retried at `page + k * 13`.
pub const DEFAULT_RETRY_OFFSET: u32 = 13;
pub const MAX_PAGE_SPAN: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    pub concurrency: usize,
    pub batch_size: usize,
    pub page_retries: u32,
    pub retry_offset: u32,
    pub max_span: u32,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            page_retries: DEFAULT_PAGE_RETRIES,
            retry_offset: DEFAULT_RETRY_OFFSET,
            max_span: MAX_PAGE_SPAN,
        }
    }
}

impl BulkOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(n) = env_parse::<usize>("BULK_CONCURRENCY").filter(|n| *n >= 1) {
            out.concurrency = n;
        }
        if let Some(n) = env_parse::<usize>("BULK_BATCH_SIZE").filter(|n| *n >= 1) {
            out.batch_size = n;
        }
        if let Some(n) = env_parse::<u32>("BULK_PAGE_RETRIES") {
            out.page_retries = n;
        }

        out
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Inclusive, validated page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: i64, end: i64, max_span: u32) -> Result<Self, InvalidInput> {
        if start < 1 {
            return Err(InvalidInput::new(
                "start_page",
                format!("must be >= 1 (got {start})"),
            ));
        }
        if end < start {
            return Err(InvalidInput::new(
                "end_page",
                format!("must be >= start_page (got start={start}, end={end})"),
            ));
        }
        if end - start > i64::from(max_span) {
            return Err(InvalidInput::new(
                "end_page",
                format!("page span {} exceeds the maximum of {max_span}", end - start),
            ));
        }
        let end = u32::try_from(end)
            .map_err(|_| InvalidInput::new("end_page", format!("out of range (got {end})")))?;
        // start <= end, so this cannot fail once end fits.
        let start = start as u32;
        Ok(Self { start, end })
    }

    pub fn page_count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub start_page: u32,
    pub end_page: u32,
    pub pages_requested: usize,
    pub pages_with_items: usize,
    pub items_fetched: usize,
    pub batches_flushed: usize,
    pub inserted: u64,
    pub total_in_store: i64,
}

/// A page task failed and the bulk job stopped. `flushed` rows were already
/// committed before the abort.
#[derive(Debug)]
pub struct BulkAborted {
    pub page: u32,
    pub flushed: u64,
    pub source: anyhow::Error,
}

impl fmt::Display for BulkAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bulk ingestion aborted at page {} after {} rows were stored: {:#}",
            self.page, self.flushed, self.source
        )
    }
}

impl std::error::Error for BulkAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

#[derive(Debug)]
struct PageOutcome {
    page: u32,
    resolved_page: Option<u32>,
    events: Vec<NewRatingEvent>,
}

/// Tries `page`, then `page + k * retry_offset` for k in 1..=retries, and keeps
/// the first non-empty page. An all-empty walk is an empty page, not an error.
async fn fetch_with_offset_retry(
    upstream: &dyn UpstreamClient,
    page: u32,
    opts: &BulkOptions,
) -> anyhow::Result<PageOutcome> {
    for attempt in 0..=opts.page_retries {
        let candidate = page.saturating_add(attempt.saturating_mul(opts.retry_offset));
        let fetched = upstream.fetch_page(candidate).await?;
        if !fetched.items.is_empty() {
            let events = fetched.events();
            if attempt > 0 {
                tracing::debug!(page, candidate, attempt, "empty page recovered at offset");
            }
            return Ok(PageOutcome {
                page,
                resolved_page: Some(candidate),
                events,
            });
        }
    }

    tracing::debug!(page, retries = opts.page_retries, "page empty after offset retries");
    Ok(PageOutcome {
        page,
        resolved_page: None,
        events: Vec::new(),
    })
}

async fn flush(
    sink: &dyn RatingSink,
    buffer: &mut Vec<NewRatingEvent>,
    report: &mut BulkReport,
) -> anyhow::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let inserted = sink.insert_batch(buffer).await?;
    report.inserted += inserted;
    report.batches_flushed += 1;
    tracing::debug!(
        batch_size = buffer.len(),
        inserted,
        total_inserted = report.inserted,
        "flushed rating batch"
    );
    buffer.clear();
    Ok(())
}

/// Replaces the stored dataset with everything upstream returns for `range`.
///
/// Destructive: the sink is cleared before any page is fetched.
pub async fn run_bulk_ingest(
    upstream: Arc<dyn UpstreamClient>,
    sink: &dyn RatingSink,
    range: PageRange,
    opts: BulkOptions,
) -> anyhow::Result<BulkReport> {
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("bulk_ingest", %run_id, start = range.start, end = range.end);
    run(upstream, sink, range, opts).instrument(span).await
}

async fn run(
    upstream: Arc<dyn UpstreamClient>,
    sink: &dyn RatingSink,
    range: PageRange,
    opts: BulkOptions,
) -> anyhow::Result<BulkReport> {
    let cleared = sink.clear_all().await?;
    tracing::info!(cleared, pages = range.page_count(), "cleared store; starting bulk ingestion");

    let concurrency = opts.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let (tx, mut rx) = mpsc::channel::<(u32, anyhow::Result<PageOutcome>)>(concurrency);

    for page in range.pages() {
        let upstream = Arc::clone(&upstream);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => fetch_with_offset_retry(upstream.as_ref(), page, &opts).await,
                Err(err) => Err(anyhow::Error::new(err).context("fetch semaphore closed")),
            };
            // The receiver is gone only when the job already aborted.
            let _ = tx.send((page, outcome)).await;
        }
        .in_current_span());
    }
    drop(tx);

    let result = collect(sink, &mut rx, range, &opts).await;
    if result.is_err() {
        // Pages still waiting for a permit stop here.
        semaphore.close();
    }
    result
}

/// Single consumer: drains page outcomes, flushes full batches and fails on the
/// first page error or sink error.
async fn collect(
    sink: &dyn RatingSink,
    rx: &mut mpsc::Receiver<(u32, anyhow::Result<PageOutcome>)>,
    range: PageRange,
    opts: &BulkOptions,
) -> anyhow::Result<BulkReport> {
    let mut report = BulkReport {
        start_page: range.start,
        end_page: range.end,
        pages_requested: range.page_count(),
        ..Default::default()
    };
    let batch_size = opts.batch_size.max(1);
    let mut buffer: Vec<NewRatingEvent> = Vec::with_capacity(batch_size);

    while let Some((page, outcome)) = rx.recv().await {
        let outcome = match outcome {
            Ok(o) => o,
            Err(source) => {
                tracing::error!(page, flushed = report.inserted, error = %source, "page fetch failed; aborting bulk ingestion");
                return Err(BulkAborted {
                    page,
                    flushed: report.inserted,
                    source,
                }
                .into());
            }
        };

        if outcome.resolved_page.is_some() {
            report.pages_with_items += 1;
        }
        report.items_fetched += outcome.events.len();
        tracing::debug!(
            page = outcome.page,
            resolved_page = ?outcome.resolved_page,
            items = outcome.events.len(),
            "page fetched"
        );

        for event in outcome.events {
            buffer.push(event);
            if buffer.len() >= batch_size {
                flush(sink, &mut buffer, &mut report).await?;
            }
        }
    }

    flush(sink, &mut buffer, &mut report).await?;

    report.total_in_store = sink.count().await?;
    tracing::info!(
        pages_with_items = report.pages_with_items,
        items_fetched = report.items_fetched,
        inserted = report.inserted,
        total_in_store = report.total_in_store,
        "bulk ingestion finished"
    );
    Ok(report)
}
