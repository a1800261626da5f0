use crate::domain::rating::{NewRatingEvent, RatingEvent};
use crate::ingest::RatingSink;
use crate::query::{like_pattern, NumericRange, RatingFilter};
use anyhow::Context;
use sqlx::{PgPool, Postgres, QueryBuilder};

const SELECT_COLUMNS: &str = "id, ticker, company_name, brokerage, action, rating_from, rating_to, \
     target_from, target_to, event_time, ingested_at";

const INSERT_COLUMNS: &str = "INSERT INTO rating_events \
     (ticker, company_name, brokerage, action, rating_from, rating_to, target_from, target_to, event_time) ";

// Only the identity constraint is ignored; every other violation still fails.
const ON_IDENTITY_CONFLICT: &str =
    " ON CONFLICT (ticker, brokerage, action, rating_from, rating_to, event_time) DO NOTHING";

const ORDER_NEWEST_INGESTED: &str = " ORDER BY ingested_at DESC, id DESC";

const SEARCH_COLUMNS: [&str; 6] = [
    "ticker",
    "company_name",
    "brokerage",
    "action",
    "rating_from",
    "rating_to",
];

/// Columns that can back a filter option list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Action,
    RatingFrom,
    RatingTo,
    Brokerage,
}

impl FilterColumn {
    fn as_sql(self) -> &'static str {
        match self {
            FilterColumn::Action => "action",
            FilterColumn::RatingFrom => "rating_from",
            FilterColumn::RatingTo => "rating_to",
            FilterColumn::Brokerage => "brokerage",
        }
    }
}

pub async fn insert_if_absent(pool: &PgPool, event: &NewRatingEvent) -> anyhow::Result<bool> {
    let sql = format!(
        "{INSERT_COLUMNS} VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9){ON_IDENTITY_CONFLICT}"
    );
    let res = sqlx::query(&sql)
        .bind(&event.ticker)
        .bind(&event.company_name)
        .bind(&event.brokerage)
        .bind(&event.action)
        .bind(&event.rating_from)
        .bind(&event.rating_to)
        .bind(&event.target_from)
        .bind(&event.target_to)
        .bind(&event.event_time)
        .execute(pool)
        .await
        .with_context(|| format!("insert rating_events failed (ticker={})", event.ticker))?;
    Ok(res.rows_affected() == 1)
}

/// Inserts the batch in one transaction. Identity duplicates are skipped; any
/// other failure rolls back the whole batch.
pub async fn insert_batch(pool: &PgPool, events: &[NewRatingEvent]) -> anyhow::Result<u64> {
    if events.is_empty() {
        return Ok(0);
    }

    let t0 = std::time::Instant::now();
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut qb = QueryBuilder::<Postgres>::new(INSERT_COLUMNS);
    qb.push_values(events, |mut b, ev| {
        b.push_bind(&ev.ticker)
            .push_bind(&ev.company_name)
            .push_bind(&ev.brokerage)
            .push_bind(&ev.action)
            .push_bind(&ev.rating_from)
            .push_bind(&ev.rating_to)
            .push_bind(&ev.target_from)
            .push_bind(&ev.target_to)
            .push_bind(&ev.event_time);
    });
    qb.push(ON_IDENTITY_CONFLICT);

    let res = qb
        .build()
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("batch insert rating_events failed")?;

    tx.commit().await.context("commit transaction failed")?;

    tracing::debug!(
        batch_size = events.len(),
        inserted = res.rows_affected(),
        elapsed_ms = t0.elapsed().as_millis(),
        "rating_events batch insert"
    );
    Ok(res.rows_affected())
}

pub async fn clear_all(pool: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM rating_events")
        .execute(pool)
        .await
        .context("delete rating_events failed")?;
    Ok(res.rows_affected())
}

pub async fn count(pool: &PgPool) -> anyhow::Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rating_events")
        .fetch_one(pool)
        .await
        .context("count rating_events failed")?;
    Ok(n)
}

/// Most recently ingested first.
pub async fn query_page(
    pool: &PgPool,
    offset: i64,
    limit: i64,
) -> anyhow::Result<(Vec<RatingEvent>, i64)> {
    query_filtered(pool, &RatingFilter::default(), offset, limit).await
}

pub async fn query_filtered(
    pool: &PgPool,
    filter: &RatingFilter,
    offset: i64,
    limit: i64,
) -> anyhow::Result<(Vec<RatingEvent>, i64)> {
    let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM rating_events");
    push_filter(&mut count_qb, filter);
    let (total,): (i64,) = count_qb
        .build_query_as()
        .fetch_one(pool)
        .await
        .context("count filtered rating_events failed")?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {SELECT_COLUMNS} FROM rating_events"));
    push_filter(&mut qb, filter);
    qb.push(ORDER_NEWEST_INGESTED);
    qb.push(" LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb
        .build_query_as::<RatingEvent>()
        .fetch_all(pool)
        .await
        .context("select filtered rating_events failed")?;

    Ok((rows, total))
}

/// Unique non-empty values of `column`, alphabetically.
pub async fn distinct_values(pool: &PgPool, column: FilterColumn) -> anyhow::Result<Vec<String>> {
    let col = column.as_sql();
    let sql = format!("SELECT DISTINCT {col} FROM rating_events WHERE {col} <> '' ORDER BY {col}");
    let values: Vec<String> = sqlx::query_scalar(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("select distinct {col} failed"))?;
    Ok(values)
}

pub async fn all_events(pool: &PgPool) -> anyhow::Result<Vec<RatingEvent>> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM rating_events ORDER BY id");
    let rows = sqlx::query_as::<_, RatingEvent>(&sql)
        .fetch_all(pool)
        .await
        .context("select rating_events failed")?;
    Ok(rows)
}

pub async fn events_for_tickers(
    pool: &PgPool,
    tickers: &[String],
    limit: i64,
) -> anyhow::Result<Vec<RatingEvent>> {
    if tickers.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM rating_events WHERE ticker = ANY($1){ORDER_NEWEST_INGESTED} LIMIT $2"
    );
    let rows = sqlx::query_as::<_, RatingEvent>(&sql)
        .bind(tickers.to_vec())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("select rating_events by ticker failed")?;
    Ok(rows)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &RatingFilter) {
    if filter.is_empty() {
        return;
    }
    qb.push(" WHERE TRUE");

    if let Some(term) = &filter.search_term {
        let pattern = like_pattern(term);
        qb.push(" AND (");
        for (i, col) in SEARCH_COLUMNS.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*col).push(" ILIKE ").push_bind(pattern.clone());
        }
        qb.push(")");
    }

    for (col, value) in [
        ("action", &filter.action),
        ("rating_from", &filter.rating_from),
        ("rating_to", &filter.rating_to),
    ] {
        if let Some(v) = value {
            qb.push(" AND ").push(col).push(" = ").push_bind(v.clone());
        }
    }

    push_range(qb, "target_from", filter.target_from);
    push_range(qb, "target_to", filter.target_to);
}

// Well inside the `numeric` type's digit limits.
const MAX_TARGET_CHARS: usize = 1000;

/// Non-numeric targets evaluate to NULL, so the comparison drops the row
/// instead of raising a cast error. `numeric` keeps long digit runs from
/// overflowing the way a `float8` cast would.
fn numeric_target_expr(col: &str) -> String {
    let cleaned = format!("REGEXP_REPLACE({col}, '[$,[:space:]]', '', 'g')");
    format!(
        r"(CASE WHEN length({cleaned}) <= {MAX_TARGET_CHARS} AND {cleaned} ~ '^-?[0-9]+(\.[0-9]+)?$' THEN {cleaned}::numeric END)"
    )
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, col: &str, range: NumericRange) {
    if let Some(min) = range.min {
        qb.push(" AND ")
            .push(numeric_target_expr(col))
            .push(" >= ")
            .push_bind(min)
            .push("::numeric");
    }
    if let Some(max) = range.max {
        qb.push(" AND ")
            .push(numeric_target_expr(col))
            .push(" <= ")
            .push_bind(max)
            .push("::numeric");
    }
}

/// [`RatingSink`] backed by the `rating_events` table.
#[derive(Debug, Clone)]
pub struct PgRatingSink {
    pool: PgPool,
}

impl PgRatingSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RatingSink for PgRatingSink {
    async fn clear_all(&self) -> anyhow::Result<u64> {
        clear_all(&self.pool).await
    }

    async fn insert_if_absent(&self, event: &NewRatingEvent) -> anyhow::Result<bool> {
        insert_if_absent(&self.pool, event).await
    }

    async fn insert_batch(&self, events: &[NewRatingEvent]) -> anyhow::Result<u64> {
        insert_batch(&self.pool, events).await
    }

    async fn count(&self) -> anyhow::Result<i64> {
        count(&self.pool).await
    }
}
