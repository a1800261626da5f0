use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use stockrate_core::domain::rating::NewRatingEvent;
use stockrate_core::ingest::RatingSink;

/// Dry-run stand-in for the database: keeps identity keys only, so counts
/// match what a real run would insert.
#[derive(Debug, Default)]
pub struct DedupSink {
    seen: Mutex<HashSet<[String; 6]>>,
}

fn key(event: &NewRatingEvent) -> [String; 6] {
    let (ticker, brokerage, action, rating_from, rating_to, event_time) = event.identity_key();
    [ticker, brokerage, action, rating_from, rating_to, event_time].map(str::to_string)
}

impl DedupSink {
    fn seen(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashSet<[String; 6]>>> {
        self.seen
            .lock()
            .map_err(|_| anyhow::anyhow!("dry-run sink lock poisoned"))
    }
}

#[async_trait]
impl RatingSink for DedupSink {
    async fn clear_all(&self) -> anyhow::Result<u64> {
        let mut seen = self.seen()?;
        let n = seen.len() as u64;
        seen.clear();
        Ok(n)
    }

    async fn insert_if_absent(&self, event: &NewRatingEvent) -> anyhow::Result<bool> {
        Ok(self.seen()?.insert(key(event)))
    }

    async fn insert_batch(&self, events: &[NewRatingEvent]) -> anyhow::Result<u64> {
        let mut seen = self.seen()?;
        Ok(events.iter().filter(|e| seen.insert(key(e))).count() as u64)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.seen()?.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ticker: &str, time: &str) -> NewRatingEvent {
        NewRatingEvent {
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Inc."),
            brokerage: "Barclays".to_string(),
            action: "target raised by".to_string(),
            rating_from: "Equal Weight".to_string(),
            rating_to: "Overweight".to_string(),
            target_from: "$10.00".to_string(),
            target_to: "$14.00".to_string(),
            event_time: time.to_string(),
        }
    }

    #[tokio::test]
    async fn dedups_by_identity() {
        let sink = DedupSink::default();
        let a = event("AAPL", "2026-10-17T00:00:00Z");
        let b = event("AAPL", "2026-10-18T00:00:00Z");

        assert_eq!(sink.insert_batch(&[a.clone(), a.clone(), b]).await.unwrap(), 2);
        assert!(!sink.insert_if_absent(&a).await.unwrap());

        let mut renamed = a.clone();
        renamed.company_name = "Apple".to_string();
        assert!(!sink.insert_if_absent(&renamed).await.unwrap());

        assert_eq!(sink.count().await.unwrap(), 2);
        assert_eq!(sink.clear_all().await.unwrap(), 2);
        assert_eq!(sink.count().await.unwrap(), 0);
    }
}
