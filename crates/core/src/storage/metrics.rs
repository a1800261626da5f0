use crate::domain::metrics::{NamedCount, RecentActivity, SentimentBreakdown, StockMetrics};
use crate::domain::parse::parse_event_time;
use crate::scoring::ratings::ActionDirection;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

const TOP_N: i64 = 10;
const RECENT_WINDOW_DAYS: i64 = 7;

// Narrows the scan to rows that look like timestamps; parsing happens in Rust.
const TIMESTAMP_SHAPE: &str = r"^\d{4}-\d{2}-\d{2}T";

/// Runs the independent aggregate queries concurrently and joins them.
pub async fn stock_metrics(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<StockMetrics> {
    let (totals, sentiment, top_brokerages, most_active_tickers, recent_activity) = tokio::try_join!(
        totals(pool),
        sentiment(pool),
        top_counts(pool, "brokerage"),
        top_counts(pool, "ticker"),
        recent_activity(pool, now),
    )?;
    let (total_ratings, unique_tickers, unique_brokerages) = totals;

    Ok(StockMetrics {
        total_ratings,
        unique_tickers,
        unique_brokerages,
        sentiment,
        top_brokerages,
        most_active_tickers,
        recent_activity,
        generated_at: now,
    })
}

async fn totals(pool: &PgPool) -> anyhow::Result<(i64, i64, i64)> {
    sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT COUNT(*), COUNT(DISTINCT ticker), COUNT(DISTINCT NULLIF(brokerage, '')) \
         FROM rating_events",
    )
    .fetch_one(pool)
    .await
    .context("metrics totals query failed")
}

async fn sentiment(pool: &PgPool) -> anyhow::Result<SentimentBreakdown> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT action, COUNT(*) FROM rating_events GROUP BY action",
    )
    .fetch_all(pool)
    .await
    .context("metrics sentiment query failed")?;
    Ok(tally_sentiment(&rows))
}

async fn top_counts(pool: &PgPool, column: &'static str) -> anyhow::Result<Vec<NamedCount>> {
    let sql = format!(
        "SELECT {column}, COUNT(*) AS n FROM rating_events \
         WHERE {column} <> '' \
         GROUP BY {column} \
         ORDER BY n DESC, {column} ASC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, (String, i64)>(&sql)
        .bind(TOP_N)
        .fetch_all(pool)
        .await
        .with_context(|| format!("metrics top {column} query failed"))?;
    Ok(rows
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect())
}

async fn recent_activity(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<RecentActivity> {
    let sql = format!(
        "SELECT ticker, event_time FROM rating_events WHERE event_time ~ '{TIMESTAMP_SHAPE}'"
    );
    let rows = sqlx::query_as::<_, (String, String)>(&sql)
        .fetch_all(pool)
        .await
        .context("metrics recent activity query failed")?;
    Ok(tally_recent(&rows, now))
}

/// Counts events whose time falls within the window before `now`. Times that
/// do not parse as RFC 3339 are skipped.
pub fn tally_recent(rows: &[(String, String)], now: DateTime<Utc>) -> RecentActivity {
    let since = now - Duration::days(RECENT_WINDOW_DAYS);
    let mut ratings = 0;
    let mut tickers = HashSet::new();
    for (ticker, event_time) in rows {
        if let Some(at) = parse_event_time(event_time).at() {
            if at >= since {
                ratings += 1;
                tickers.insert(ticker.as_str());
            }
        }
    }
    RecentActivity {
        window_days: RECENT_WINDOW_DAYS,
        ratings,
        tickers: tickers.len() as i64,
    }
}

/// Buckets per-action counts into bullish / bearish / neutral.
pub fn tally_sentiment(action_counts: &[(String, i64)]) -> SentimentBreakdown {
    let mut out = SentimentBreakdown::default();
    for (action, n) in action_counts {
        match ActionDirection::classify(action) {
            ActionDirection::Bullish => out.bullish += n,
            ActionDirection::Bearish => out.bearish += n,
            ActionDirection::Initiated | ActionDirection::Neutral => out.neutral += n,
        }
    }
    out
}
