pub mod ratings;
pub mod weights;

use crate::domain::parse::{parse_currency, parse_event_time, Currency};
use crate::domain::rating::RatingEvent;
use crate::domain::recommendation::ScoredRecommendation;
use chrono::{DateTime, Duration, Utc};
use ratings::{is_buy_like, is_rating_improvement, ActionDirection};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub use weights::ScoringWeights;

pub const BASE_SCORE: f64 = 5.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Scores below this never show up in a recommendations listing.
pub const MIN_RECOMMENDATION_SCORE: f64 = 5.0;

const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub label: &'static str,
    pub reason: String,
    pub rating_improvement: bool,
    pub target_change_percent: Option<f64>,
}

pub fn label_for(score: f64) -> &'static str {
    if score >= 8.5 {
        "Strong Buy"
    } else if score >= 7.0 {
        "Buy"
    } else if score >= 6.0 {
        "Moderate Buy"
    } else {
        "Hold"
    }
}

pub fn passes_min_score(score: f64) -> bool {
    score >= MIN_RECOMMENDATION_SCORE
}

/// Percent change from `target_from` to `target_to`, when both parse and the
/// starting target is positive.
pub fn target_change_percent(target_from: &str, target_to: &str) -> Option<f64> {
    let (Currency::Amount(from), Currency::Amount(to)) =
        (parse_currency(target_from), parse_currency(target_to))
    else {
        return None;
    };
    if from <= 0.0 {
        return None;
    }
    Some((to - from) / from * 100.0)
}

fn target_signal(event: &RatingEvent, reasons: &mut Vec<String>) -> (f64, Option<f64>) {
    let pct = target_change_percent(&event.target_from, &event.target_to);
    let raw = match pct {
        Some(p) if p > 20.0 => 3.0,
        Some(p) if p > 10.0 => 2.0,
        Some(p) if p > 5.0 => 1.0,
        Some(p) if p < 0.0 => -2.0,
        _ => 0.0,
    };
    match pct {
        Some(p) if p > 0.0 => reasons.push(format!("target raised {p:.1}%")),
        Some(p) if p < 0.0 => reasons.push(format!("target cut {:.1}%", p.abs())),
        _ => {}
    }
    (raw, pct)
}

fn rating_signal(event: &RatingEvent, reasons: &mut Vec<String>) -> (f64, bool) {
    let improved = is_rating_improvement(&event.rating_from, &event.rating_to);
    let mut raw = 0.0;
    if improved {
        raw += 2.0;
        reasons.push(format!(
            "rating upgraded {} -> {}",
            event.rating_from, event.rating_to
        ));
    }

    let to = event.rating_to.to_ascii_lowercase();
    if to.contains("strong buy") || to.contains("overweight") {
        raw += 1.5;
        reasons.push(format!("{} rating", event.rating_to));
    } else if to.contains("buy") || to.contains("outperform") {
        raw += 1.0;
        reasons.push(format!("{} rating", event.rating_to));
    }
    (raw, improved)
}

fn action_signal(event: &RatingEvent, reasons: &mut Vec<String>) -> f64 {
    let raw = match ActionDirection::classify(&event.action) {
        ActionDirection::Bullish => 1.5,
        ActionDirection::Initiated if is_buy_like(&event.rating_to) => 1.0,
        ActionDirection::Bearish => -1.5,
        _ => 0.0,
    };
    if raw != 0.0 {
        reasons.push(format!("{} {}", event.action, event.brokerage).trim().to_string());
    }
    raw
}

fn recency_signal(
    event: &RatingEvent,
    sibling_count: usize,
    now: DateTime<Utc>,
    reasons: &mut Vec<String>,
) -> f64 {
    let mut raw = 0.0;
    if let Some(at) = parse_event_time(&event.event_time).at() {
        if now.signed_duration_since(at) < Duration::hours(RECENT_WINDOW_HOURS) {
            raw += 0.5;
            reasons.push("rated within the last 24h".to_string());
        }
    }
    if sibling_count > 1 {
        raw += 0.5;
        reasons.push(format!("{sibling_count} analyst ratings on record"));
    }
    raw
}

/// Scores one event. `sibling_count` is the number of stored events for the
/// same ticker, this one included.
pub fn score_event(
    event: &RatingEvent,
    sibling_count: usize,
    weights: &ScoringWeights,
    now: DateTime<Utc>,
) -> Score {
    let mut reasons = Vec::new();

    let (target_raw, target_change_percent) = target_signal(event, &mut reasons);
    let (rating_raw, rating_improvement) = rating_signal(event, &mut reasons);
    let action_raw = action_signal(event, &mut reasons);
    let recency_raw = recency_signal(event, sibling_count, now, &mut reasons);

    let adjustment = target_raw * weights.target()
        + rating_raw * weights.rating()
        + action_raw * weights.action()
        + recency_raw * weights.recency();
    let value = (BASE_SCORE + adjustment).clamp(MIN_SCORE, MAX_SCORE);

    let reason = if reasons.is_empty() {
        "no strong signals".to_string()
    } else {
        reasons.join("; ")
    };

    Score {
        value,
        label: label_for(value),
        reason,
        rating_improvement,
        target_change_percent,
    }
}

/// Orders two events for the same ticker: the later parsed `event_time` wins,
/// a parsed time beats an unparseable one, and anything else falls back to the
/// higher surrogate id.
fn latest_order(a: &RatingEvent, b: &RatingEvent) -> Ordering {
    let ta = parse_event_time(&a.event_time).at();
    let tb = parse_event_time(&b.event_time).at();
    ta.cmp(&tb).then(a.id.cmp(&b.id))
}

/// Groups events by ticker and returns each ticker's latest event with the
/// number of events seen for it, in ticker order.
pub fn latest_per_ticker(events: &[RatingEvent]) -> Vec<(&RatingEvent, usize)> {
    let mut groups: BTreeMap<&str, (&RatingEvent, usize)> = BTreeMap::new();
    for ev in events {
        groups
            .entry(ev.ticker.as_str())
            .and_modify(|(latest, count)| {
                *count += 1;
                if latest_order(ev, latest) == Ordering::Greater {
                    *latest = ev;
                }
            })
            .or_insert((ev, 1));
    }
    groups.into_values().collect()
}

/// Scores every ticker and returns those at or above the minimum score, best
/// first. Equal scores keep ticker order.
pub fn recommend(
    events: &[RatingEvent],
    weights: &ScoringWeights,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<ScoredRecommendation> {
    let scored = latest_per_ticker(events)
        .into_iter()
        .map(|(latest, sibling_count)| {
            let score = score_event(latest, sibling_count, weights, now);
            ScoredRecommendation {
                ticker: latest.ticker.clone(),
                company_name: latest.company_name.clone(),
                latest: latest.clone(),
                score: score.value,
                recommendation: score.label.to_string(),
                reason: score.reason,
                rating_improvement: score.rating_improvement,
                target_change_percent: score.target_change_percent,
                sibling_count,
            }
        })
        .collect();
    select_top(scored, limit)
}

pub fn select_top(
    scored: Vec<ScoredRecommendation>,
    limit: usize,
) -> Vec<ScoredRecommendation> {
    let mut out: Vec<_> = scored
        .into_iter()
        .filter(|r| passes_min_score(r.score))
        .collect();
    // sort_by is stable.
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn event(id: i64, ticker: &str) -> RatingEvent {
        RatingEvent {
            id,
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Corp"),
            brokerage: "Acme Securities".to_string(),
            action: "reiterated by".to_string(),
            rating_from: "Neutral".to_string(),
            rating_to: "Neutral".to_string(),
            target_from: "$100.00".to_string(),
            target_to: "$100.00".to_string(),
            event_time: "2026-09-01T00:00:00Z".to_string(),
            ingested_at: now(),
        }
    }

    fn scored(ticker: &str, score: f64) -> ScoredRecommendation {
        let latest = event(1, ticker);
        ScoredRecommendation {
            ticker: ticker.to_string(),
            company_name: latest.company_name.clone(),
            latest,
            score,
            recommendation: label_for(score).to_string(),
            reason: String::new(),
            rating_improvement: false,
            target_change_percent: None,
            sibling_count: 1,
        }
    }

    #[test]
    fn neutral_event_scores_base() {
        let s = score_event(&event(1, "MSFT"), 1, &ScoringWeights::default(), now());
        assert_eq!(s.value, BASE_SCORE);
        assert_eq!(s.label, "Hold");
        assert_eq!(s.reason, "no strong signals");
        assert_eq!(s.target_change_percent, Some(0.0));
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(label_for(8.5), "Strong Buy");
        assert_eq!(label_for(8.49), "Buy");
        assert_eq!(label_for(7.0), "Buy");
        assert_eq!(label_for(6.0), "Moderate Buy");
        assert_eq!(label_for(5.99), "Hold");
    }

    #[test]
    fn target_cut_and_downgrade_lower_the_score() {
        let mut ev = event(1, "INTC");
        ev.action = "downgraded by".to_string();
        ev.rating_from = "Buy".to_string();
        ev.rating_to = "Sell".to_string();
        ev.target_from = "$40.00".to_string();
        ev.target_to = "$30.00".to_string();
        let s = score_event(&ev, 1, &ScoringWeights::default(), now());
        // 5.0 + (-2.0 * 0.4) + (0 * 0.3) + (-1.5 * 0.2)
        assert!((s.value - 3.9).abs() < 1e-9);
        assert!(!s.rating_improvement);
    }

    #[test]
    fn unparseable_targets_contribute_nothing() {
        let mut ev = event(1, "XYZ");
        ev.target_from = "n/a".to_string();
        ev.target_to = "$500".to_string();
        let s = score_event(&ev, 1, &ScoringWeights::default(), now());
        assert_eq!(s.value, BASE_SCORE);
        assert_eq!(s.target_change_percent, None);
    }

    #[test]
    fn initiated_counts_only_with_buy_like_rating() {
        let w = ScoringWeights::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let mut ev = event(1, "NVDA");
        ev.action = "initiated by".to_string();
        ev.rating_to = "Outperform".to_string();
        assert_eq!(score_event(&ev, 1, &w, now()).value, 6.0);

        ev.rating_to = "Neutral".to_string();
        assert_eq!(score_event(&ev, 1, &w, now()).value, BASE_SCORE);
    }

    #[test]
    fn recency_and_consensus_bonus() {
        let w = ScoringWeights::new(0.0, 0.0, 0.0, 1.0).unwrap();
        let mut ev = event(1, "AMD");
        ev.event_time = "2026-10-18T01:00:00Z".to_string();
        assert_eq!(score_event(&ev, 1, &w, now()).value, 5.5);
        assert_eq!(score_event(&ev, 3, &w, now()).value, 6.0);

        ev.event_time = "2026-10-17T11:00:00Z".to_string();
        assert_eq!(score_event(&ev, 1, &w, now()).value, BASE_SCORE);

        ev.event_time = "garbage".to_string();
        assert_eq!(score_event(&ev, 1, &w, now()).value, BASE_SCORE);
    }

    #[test]
    fn scores_stay_within_bounds() {
        let weight_sets = [
            ScoringWeights::default(),
            ScoringWeights::new(1.0, 0.0, 0.0, 0.0).unwrap(),
            ScoringWeights::new(0.0, 1.0, 0.0, 0.0).unwrap(),
            ScoringWeights::new(0.0, 0.0, 1.0, 0.0).unwrap(),
        ];
        let ratings = ["Strong Sell", "Hold", "Strong Buy", "Overweight", "", "???"];
        let targets = [("$1.00", "$1000.00"), ("$1000.00", "$1.00"), ("x", "y")];
        let actions = ["upgraded by", "target lowered by", "initiated by", ""];

        for w in &weight_sets {
            for from in ratings {
                for to in ratings {
                    for (tf, tt) in targets {
                        for action in actions {
                            let mut ev = event(1, "ANY");
                            ev.rating_from = from.to_string();
                            ev.rating_to = to.to_string();
                            ev.target_from = tf.to_string();
                            ev.target_to = tt.to_string();
                            ev.action = action.to_string();
                            ev.event_time = "2026-10-18T11:00:00Z".to_string();
                            let s = score_event(&ev, 5, w, now());
                            assert!(
                                (MIN_SCORE..=MAX_SCORE).contains(&s.value),
                                "score {} out of bounds",
                                s.value
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn latest_per_ticker_prefers_parsed_then_later_then_higher_id() {
        let mut a = event(1, "AAPL");
        a.event_time = "2026-10-10T00:00:00Z".to_string();
        let mut b = event(2, "AAPL");
        b.event_time = "2026-10-12T00:00:00Z".to_string();
        let mut c = event(3, "AAPL");
        c.event_time = "not a time".to_string();
        let events = vec![b.clone(), c, a];

        let latest = latest_per_ticker(&events);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].0.id, 2);
        assert_eq!(latest[0].1, 3);
    }

    #[test]
    fn equal_times_break_ties_by_highest_id() {
        let mut low = event(7, "TSLA");
        low.rating_to = "Sell".to_string();
        let high = event(9, "TSLA");
        let bad_a = {
            let mut e = event(4, "META");
            e.event_time = "??".to_string();
            e
        };
        let bad_b = {
            let mut e = event(5, "META");
            e.event_time = "!!".to_string();
            e
        };

        for events in [
            vec![low.clone(), high.clone(), bad_a.clone(), bad_b.clone()],
            vec![bad_b, high, bad_a, low],
        ] {
            let latest = latest_per_ticker(&events);
            let ids: Vec<i64> = latest.iter().map(|(e, _)| e.id).collect();
            assert_eq!(ids, vec![5, 9]);
        }
    }

    #[test]
    fn min_score_gate_is_inclusive() {
        let out = select_top(vec![scored("LOW", 4.9), scored("EDGE", 5.0)], 10);
        let tickers: Vec<&str> = out.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["EDGE"]);
    }

    #[test]
    fn select_top_sorts_descending_and_truncates() {
        let out = select_top(
            vec![
                scored("A", 6.0),
                scored("B", 7.5),
                scored("C", 6.0),
                scored("D", 9.0),
            ],
            3,
        );
        let tickers: Vec<&str> = out.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["D", "B", "A"]);
    }

    #[test]
    fn aapl_upgrade_with_raised_target_is_recommended() {
        let mut fresh = event(2, "AAPL");
        fresh.company_name = "Apple Inc.".to_string();
        fresh.action = "target raised by".to_string();
        fresh.rating_from = "Hold".to_string();
        fresh.rating_to = "Buy".to_string();
        fresh.target_from = "$150.00".to_string();
        fresh.target_to = "$180.00".to_string();
        fresh.event_time = now().to_rfc3339();

        let mut older = event(1, "AAPL");
        older.event_time = "2026-08-01T00:00:00Z".to_string();

        let recs = recommend(&[older, fresh], &ScoringWeights::default(), now(), 10);
        let aapl = recs.iter().find(|r| r.ticker == "AAPL").unwrap();
        assert!(aapl.score >= 7.0, "score {}", aapl.score);
        assert!(aapl.recommendation == "Buy" || aapl.recommendation == "Strong Buy");
        assert!(aapl.rating_improvement);
        assert_eq!(aapl.latest.id, 2);
        assert_eq!(aapl.sibling_count, 2);
    }
}
