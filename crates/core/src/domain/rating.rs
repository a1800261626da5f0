use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One analyst action on one ticker, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RatingEvent {
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: String,
    pub target_to: String,
    pub event_time: String,
    pub ingested_at: DateTime<Utc>,
}

/// A rating event that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRatingEvent {
    pub ticker: String,
    pub company_name: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: String,
    pub target_to: String,
    pub event_time: String,
}

/// Columns that make up the business identity of a rating event. Mirrors the
/// `rating_events_identity` unique constraint.
pub type IdentityKey<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str, &'a str);

impl NewRatingEvent {
    pub fn identity_key(&self) -> IdentityKey<'_> {
        (
            &self.ticker,
            &self.brokerage,
            &self.action,
            &self.rating_from,
            &self.rating_to,
            &self.event_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_company_and_targets() {
        let a = NewRatingEvent {
            ticker: "AAPL".to_string(),
            company_name: "Apple Inc.".to_string(),
            brokerage: "Goldman Sachs".to_string(),
            action: "target raised by".to_string(),
            rating_from: "Hold".to_string(),
            rating_to: "Buy".to_string(),
            target_from: "$150.00".to_string(),
            target_to: "$180.00".to_string(),
            event_time: "2026-10-17T12:00:00Z".to_string(),
        };
        let mut b = a.clone();
        b.company_name = "Apple".to_string();
        b.target_to = "$190.00".to_string();
        assert_eq!(a.identity_key(), b.identity_key());

        b.brokerage = "Morgan Stanley".to_string();
        assert_ne!(a.identity_key(), b.identity_key());
    }
}
