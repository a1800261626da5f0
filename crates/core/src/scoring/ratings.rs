//! Keyword heuristics over the free-text rating and action labels.

/// Rank of a rating label; labels outside the table rank 0.
pub fn rating_rank(label: &str) -> u8 {
    match label.trim().to_ascii_lowercase().as_str() {
        "strong sell" => 1,
        "sell" => 2,
        "underperform" | "underweight" => 3,
        "hold" => 4,
        "neutral" => 5,
        "outperform" => 6,
        "buy" | "overweight" => 7,
        "strong buy" => 8,
        _ => 0,
    }
}

pub fn is_rating_improvement(from: &str, to: &str) -> bool {
    rating_rank(to) > rating_rank(from)
}

pub fn is_buy_like(rating: &str) -> bool {
    let r = rating.to_ascii_lowercase();
    r.contains("buy") || r.contains("outperform") || r.contains("overweight")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionDirection {
    Bullish,
    Initiated,
    Bearish,
    Neutral,
}

impl ActionDirection {
    pub fn classify(action: &str) -> Self {
        let a = action.to_ascii_lowercase();
        if a.contains("raised") || a.contains("upgrade") {
            ActionDirection::Bullish
        } else if a.contains("initiated") {
            ActionDirection::Initiated
        } else if a.contains("lowered") || a.contains("downgrade") {
            ActionDirection::Bearish
        } else {
            ActionDirection::Neutral
        }
    }
}
