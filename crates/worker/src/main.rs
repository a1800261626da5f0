use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stockrate_core::ingest::bulk::{run_bulk_ingest, BulkOptions, BulkReport, PageRange};
use stockrate_core::ingest::provider::{HttpUpstreamClient, UpstreamClient};
use stockrate_core::ingest::RatingSink;
use stockrate_core::storage::ratings::PgRatingSink;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sink;

#[derive(Debug, Parser)]
#[command(name = "stockrate_worker")]
struct Args {
    /// First upstream page to fetch (inclusive).
    #[arg(long)]
    start_page: i64,

    /// Last upstream page to fetch (inclusive). Defaults to `--start-page`.
    #[arg(long)]
    end_page: Option<i64>,

    /// Fetch and dedup in memory without touching the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockrate_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let opts = BulkOptions::from_env();
    let range = PageRange::new(
        args.start_page,
        args.end_page.unwrap_or(args.start_page),
        opts.max_span,
    )?;

    let upstream: Arc<dyn UpstreamClient> = Arc::new(HttpUpstreamClient::from_settings(&settings)?);

    let result = if args.dry_run {
        tracing::info!(start = range.start, end = range.end, dry_run = true, "bulk run starting");
        run(upstream, &sink::DedupSink::default(), range, opts).await
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        stockrate_core::storage::migrate(&pool).await?;

        tracing::info!(start = range.start, end = range.end, dry_run = false, "bulk run starting");
        run(upstream, &PgRatingSink::new(pool), range, opts).await
    };

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "bulk run failed");
            Err(err)
        }
    }
}

async fn run(
    upstream: Arc<dyn UpstreamClient>,
    sink: &dyn RatingSink,
    range: PageRange,
    opts: BulkOptions,
) -> anyhow::Result<BulkReport> {
    let report = run_bulk_ingest(upstream, sink, range, opts).await?;
    tracing::info!(
        pages = report.pages_requested,
        pages_with_items = report.pages_with_items,
        items = report.items_fetched,
        inserted = report.inserted,
        total = report.total_in_store,
        "bulk run finished"
    );
    Ok(report)
}

fn init_sentry(settings: &stockrate_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_page_defaults_to_start() {
        let args = Args::try_parse_from(["stockrate_worker", "--start-page", "4"]).unwrap();
        assert_eq!(args.start_page, 4);
        assert_eq!(args.end_page, None);
        assert!(!args.dry_run);

        let args = Args::try_parse_from([
            "stockrate_worker",
            "--start-page",
            "1",
            "--end-page",
            "20",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.end_page, Some(20));
        assert!(args.dry_run);
    }

    #[test]
    fn start_page_is_required() {
        assert!(Args::try_parse_from(["stockrate_worker"]).is_err());
    }
}
