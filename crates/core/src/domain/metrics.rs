use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetrics {
    pub total_ratings: i64,
    pub unique_tickers: i64,
    pub unique_brokerages: i64,
    pub sentiment: SentimentBreakdown,
    pub top_brokerages: Vec<NamedCount>,
    pub most_active_tickers: Vec<NamedCount>,
    pub recent_activity: RecentActivity,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub bullish: i64,
    pub bearish: i64,
    pub neutral: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub window_days: i64,
    pub ratings: i64,
    pub tickers: i64,
}
