use crate::domain::rating::NewRatingEvent;
use serde::{Deserialize, Serialize};

/// One page of the upstream listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamEnvelope {
    #[serde(default)]
    pub items: Vec<UpstreamItem>,
    #[serde(default)]
    pub next_page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamItem {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub target_from: String,
    #[serde(default)]
    pub target_to: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub brokerage: String,
    #[serde(default)]
    pub rating_from: String,
    #[serde(default)]
    pub rating_to: String,
    #[serde(default)]
    pub time: String,
}

impl UpstreamItem {
    /// `None` when the ticker is blank; such rows cannot be stored.
    pub fn to_event(&self) -> Option<NewRatingEvent> {
        let ticker = self.ticker.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            return None;
        }
        Some(NewRatingEvent {
            ticker,
            company_name: self.company.trim().to_string(),
            brokerage: self.brokerage.trim().to_string(),
            action: self.action.trim().to_string(),
            rating_from: self.rating_from.trim().to_string(),
            rating_to: self.rating_to.trim().to_string(),
            target_from: self.target_from.trim().to_string(),
            target_to: self.target_to.trim().to_string(),
            event_time: self.time.trim().to_string(),
        })
    }
}

/// What a single upstream call produced. Non-2xx responses are represented as
/// an empty page with their status kept, not as errors.
#[derive(Debug, Clone)]
pub struct UpstreamPage {
    pub status: u16,
    pub items: Vec<UpstreamItem>,
    pub next_page: String,
}

impl UpstreamPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn events(&self) -> Vec<NewRatingEvent> {
        let events: Vec<_> = self.items.iter().filter_map(UpstreamItem::to_event).collect();
        let skipped = self.items.len() - events.len();
        if skipped > 0 {
            tracing::warn!(skipped, "upstream items without ticker skipped");
        }
        events
    }
}
