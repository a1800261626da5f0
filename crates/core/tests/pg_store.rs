//! Needs a disposable Postgres: `DATABASE_URL=... cargo test -- --ignored`.
//! Each test works on its own random tickers so runs can share a database.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use stockrate_core::domain::rating::NewRatingEvent;
use stockrate_core::query::{NumericRange, PageMeta, PageRequest, RatingFilter};
use stockrate_core::scoring::{self, ScoringWeights};
use stockrate_core::storage::metrics::stock_metrics;
use stockrate_core::storage::ratings::FilterColumn;
use stockrate_core::storage::{self, ratings};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPool::connect(&url).await.expect("connect");
    storage::migrate(&pool).await.expect("migrate");
    pool
}

fn unique_ticker(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &id[..8]).to_ascii_uppercase()
}

fn event(ticker: &str, brokerage: &str, time: &str) -> NewRatingEvent {
    NewRatingEvent {
        ticker: ticker.to_string(),
        company_name: format!("{ticker} Holdings"),
        brokerage: brokerage.to_string(),
        action: "target raised by".to_string(),
        rating_from: "Neutral".to_string(),
        rating_to: "Buy".to_string(),
        target_from: "$1,000.00".to_string(),
        target_to: "$1,250.50".to_string(),
        event_time: time.to_string(),
    }
}

#[tokio::test]
#[ignore]
async fn ingestion_is_idempotent() {
    let pool = pool().await;
    let ticker = unique_ticker("ID");
    let a = event(&ticker, "Goldman Sachs", "2026-10-17T00:30:05Z");
    let b = event(&ticker, "Morgan Stanley", "2026-10-17T00:30:05Z");

    assert!(ratings::insert_if_absent(&pool, &a).await.unwrap());
    assert!(!ratings::insert_if_absent(&pool, &a).await.unwrap());

    // Same identity with a different company name is still a duplicate.
    let mut renamed = a.clone();
    renamed.company_name = "Renamed Corp".to_string();
    assert_eq!(
        ratings::insert_batch(&pool, &[renamed, b.clone(), b]).await.unwrap(),
        1
    );

    let stored = ratings::events_for_tickers(&pool, &[ticker.clone()], 100)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.company_name == format!("{ticker} Holdings")));
}

#[tokio::test]
#[ignore]
async fn failed_batch_stores_nothing() {
    let pool = pool().await;
    let ticker = unique_ticker("AT");
    let good = event(&ticker, "Barclays", "2026-10-17T00:30:05Z");
    let bad = event("", "Barclays", "2026-10-17T00:30:05Z");

    let err = ratings::insert_batch(&pool, &[good, bad]).await.unwrap_err();
    assert!(format!("{err:#}").contains("batch insert"));

    let stored = ratings::events_for_tickers(&pool, &[ticker], 100)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
#[ignore]
async fn filtered_pages_cover_all_matches() {
    let pool = pool().await;
    let ticker = unique_ticker("PG");
    let events: Vec<_> = (0..5)
        .map(|i| event(&ticker, &format!("Broker {i}"), "2026-10-16T12:00:00Z"))
        .collect();
    assert_eq!(ratings::insert_batch(&pool, &events).await.unwrap(), 5);

    let filter = RatingFilter {
        search_term: Some(ticker.to_ascii_lowercase()),
        ..Default::default()
    };

    let mut seen = Vec::new();
    for page_number in 1..=3 {
        let req = PageRequest::new(page_number, 2).unwrap();
        let (items, total) = ratings::query_filtered(&pool, &filter, req.offset(), req.limit())
            .await
            .unwrap();
        let meta = PageMeta::new(req, total);
        assert_eq!(meta.total_count, 5);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.has_next, page_number < 3);
        seen.extend(items.into_iter().map(|e| e.brokerage));
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
#[ignore]
async fn target_range_skips_unparseable_and_huge_values() {
    let pool = pool().await;
    let ticker = unique_ticker("NR");
    let targets = [
        ("Huge", format!("${}", "9".repeat(400))),
        ("Garbage", "abc".to_string()),
        ("Normal", "$1,250.50".to_string()),
        ("Small", "$12.00".to_string()),
    ];
    let events: Vec<_> = targets
        .iter()
        .map(|(brokerage, target)| {
            let mut e = event(&ticker, brokerage, "2026-10-16T12:00:00Z");
            e.target_from = target.clone();
            e
        })
        .collect();
    assert_eq!(ratings::insert_batch(&pool, &events).await.unwrap(), 4);

    let filter = RatingFilter {
        search_term: Some(ticker.clone()),
        target_from: NumericRange {
            min: Some(1000.0),
            max: None,
        },
        ..Default::default()
    };
    let (items, total) = ratings::query_filtered(&pool, &filter, 0, 10).await.unwrap();
    assert_eq!(total, 2);
    let mut brokerages: Vec<_> = items.into_iter().map(|e| e.brokerage).collect();
    brokerages.sort();
    assert_eq!(brokerages, vec!["Huge", "Normal"]);
}

#[tokio::test]
#[ignore]
async fn distinct_values_are_sorted_without_blanks() {
    let pool = pool().await;
    let ticker = unique_ticker("DV");
    let zeta = format!("Zeta {ticker}");
    let alpha = format!("Alpha {ticker}");
    let mut blank = event(&ticker, "", "2026-10-16T12:00:00Z");
    blank.action = "initiated by".to_string();
    let events = vec![
        event(&ticker, &zeta, "2026-10-16T12:00:00Z"),
        event(&ticker, &alpha, "2026-10-16T12:00:00Z"),
        event(&ticker, &alpha, "2026-10-15T12:00:00Z"),
        blank,
    ];
    assert_eq!(ratings::insert_batch(&pool, &events).await.unwrap(), 4);

    let values = ratings::distinct_values(&pool, FilterColumn::Brokerage)
        .await
        .unwrap();
    assert!(!values.iter().any(|v| v.is_empty()));
    let pos = |name: &str| {
        let hits: Vec<_> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_str() == name)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits.len(), 1, "{name} listed {} times", hits.len());
        hits[0]
    };
    assert!(pos(&alpha) < pos(&zeta));
}

#[tokio::test]
#[ignore]
async fn unfiltered_page_lists_newest_ingested_first() {
    let pool = pool().await;
    let ticker = unique_ticker("OR");
    let first = event(&ticker, "First", "2026-10-16T12:00:00Z");
    assert!(ratings::insert_if_absent(&pool, &first).await.unwrap());
    let later = [
        event(&ticker, "Second", "2026-10-16T12:00:00Z"),
        event(&ticker, "Third", "2026-10-16T12:00:00Z"),
    ];
    assert_eq!(ratings::insert_batch(&pool, &later).await.unwrap(), 2);

    let (items, total) = ratings::query_page(&pool, 0, 1000).await.unwrap();
    assert!(total >= 3);
    let ours: Vec<_> = items
        .iter()
        .filter(|e| e.ticker == ticker)
        .map(|e| e.brokerage.as_str())
        .collect();
    // One batch shares an ingestion time, so the higher id comes first.
    assert_eq!(ours, vec!["Third", "Second", "First"]);
    assert!(items
        .windows(2)
        .all(|w| (w[0].ingested_at, w[0].id) > (w[1].ingested_at, w[1].id)));
}

#[tokio::test]
#[ignore]
async fn metrics_tolerate_impossible_dates() {
    let pool = pool().await;
    let ticker = unique_ticker("MT");
    let now = Utc::now();
    let before = stock_metrics(&pool, now).await.unwrap();

    let events = vec![
        event(&ticker, "Recent A", &(now - Duration::hours(1)).to_rfc3339()),
        event(&ticker, "Recent B", &(now - Duration::days(2)).to_rfc3339()),
        event(&ticker, "Impossible", "2026-02-30T00:00:00Z"),
        event(&ticker, "Stale", "2020-01-01T00:00:00Z"),
    ];
    assert_eq!(ratings::insert_batch(&pool, &events).await.unwrap(), 4);

    let after = stock_metrics(&pool, now).await.unwrap();
    assert_eq!(after.recent_activity.window_days, 7);
    assert!(after.total_ratings >= before.total_ratings + 4);
    assert!(after.recent_activity.ratings >= before.recent_activity.ratings + 2);
    assert!(after.recent_activity.tickers >= 1);
}

#[tokio::test]
#[ignore]
async fn stored_events_score_like_in_memory_ones() {
    let pool = pool().await;
    let ticker = unique_ticker("AAPL");
    let now = Utc::now();

    let mut older = event(&ticker, "Wedbush", "2026-08-01T00:00:00Z");
    older.company_name = "Apple Inc.".to_string();
    let mut fresh = event(&ticker, "Morgan Stanley", &now.to_rfc3339());
    fresh.company_name = "Apple Inc.".to_string();
    fresh.rating_from = "Hold".to_string();
    fresh.target_from = "$150.00".to_string();
    fresh.target_to = "$180.00".to_string();
    assert_eq!(ratings::insert_batch(&pool, &[older, fresh]).await.unwrap(), 2);

    let stored: Vec<_> = ratings::all_events(&pool)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.ticker == ticker)
        .collect();
    assert_eq!(stored.len(), 2);

    let recs = scoring::recommend(&stored, &ScoringWeights::default(), now, 10);
    assert_eq!(recs.len(), 1);
    let rec = &recs[0];
    assert!(rec.score >= 7.0, "score {}", rec.score);
    assert_eq!(rec.recommendation, "Buy");
    assert!(rec.rating_improvement);
    assert_eq!(rec.latest.brokerage, "Morgan Stanley");
    assert_eq!(rec.sibling_count, 2);
}
