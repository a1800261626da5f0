use crate::domain::rating::RatingEvent;
use serde::{Deserialize, Serialize};

/// A ticker's latest rating with its computed score. Derived on every request,
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecommendation {
    pub ticker: String,
    pub company_name: String,
    pub latest: RatingEvent,
    pub score: f64,
    pub recommendation: String,
    pub reason: String,
    pub rating_improvement: bool,
    pub target_change_percent: Option<f64>,
    pub sibling_count: usize,
}
