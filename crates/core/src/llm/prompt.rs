use crate::domain::metrics::StockMetrics;
use crate::domain::rating::RatingEvent;
use crate::domain::recommendation::ScoredRecommendation;
use crate::llm::{ChatRole, ChatTurn, CompletionRequest};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Older turns are dropped so a long conversation cannot grow the prompt
/// without bound.
pub const MAX_HISTORY_TURNS: usize = 10;

/// Caps the number of grounding events quoted into a chat prompt.
pub const MAX_CONTEXT_EVENTS: usize = 20;

const SUMMARY_SYSTEM: &str = "You are an equity research assistant. \
Summarize analyst rating activity for a retail investor in 3 to 5 short paragraphs. \
Use only the figures provided. Do not invent tickers, prices or ratings. \
This is not investment advice; say so in one closing sentence.";

const CHAT_SYSTEM: &str = "You are an equity research assistant answering questions \
about stored analyst rating events. Ground every claim in the context block. \
If the context does not cover the question, say that you do not have the data. \
Keep answers under 200 words and never present them as investment advice.";

fn write_metrics(out: &mut String, m: &StockMetrics) {
    let _ = writeln!(
        out,
        "Totals: {} ratings, {} tickers, {} brokerages.",
        m.total_ratings, m.unique_tickers, m.unique_brokerages
    );
    let _ = writeln!(
        out,
        "Sentiment: {} bullish, {} bearish, {} neutral.",
        m.sentiment.bullish, m.sentiment.bearish, m.sentiment.neutral
    );
    let _ = writeln!(
        out,
        "Last {} days: {} ratings across {} tickers.",
        m.recent_activity.window_days, m.recent_activity.ratings, m.recent_activity.tickers
    );
    if !m.top_brokerages.is_empty() {
        let names: Vec<String> = m
            .top_brokerages
            .iter()
            .map(|c| format!("{} ({})", c.name, c.count))
            .collect();
        let _ = writeln!(out, "Most active brokerages: {}.", names.join(", "));
    }
    if !m.most_active_tickers.is_empty() {
        let names: Vec<String> = m
            .most_active_tickers
            .iter()
            .map(|c| format!("{} ({})", c.name, c.count))
            .collect();
        let _ = writeln!(out, "Most rated tickers: {}.", names.join(", "));
    }
}

fn write_recommendations(out: &mut String, recs: &[ScoredRecommendation]) {
    if recs.is_empty() {
        out.push_str("No ticker currently scores at or above the recommendation threshold.\n");
        return;
    }
    for r in recs {
        let _ = writeln!(
            out,
            "- {} ({}): score {:.1} {}; latest {} {} -> {} by {}; {}",
            r.ticker,
            r.company_name,
            r.score,
            r.recommendation,
            r.latest.action,
            r.latest.rating_from,
            r.latest.rating_to,
            r.latest.brokerage,
            r.reason
        );
    }
}

fn write_event(out: &mut String, e: &RatingEvent) {
    let _ = writeln!(
        out,
        "- {} {}: {} {}, rating {} -> {}, target {} -> {}",
        e.event_time,
        e.ticker,
        e.brokerage,
        e.action,
        e.rating_from,
        e.rating_to,
        e.target_from,
        e.target_to
    );
}

pub fn summary_prompt(recs: &[ScoredRecommendation], metrics: &StockMetrics) -> CompletionRequest {
    let mut body = String::from("Market snapshot\n");
    write_metrics(&mut body, metrics);
    body.push_str("\nTop recommendations\n");
    write_recommendations(&mut body, recs);
    body.push_str("\nWrite the summary now.");

    CompletionRequest {
        system: SUMMARY_SYSTEM.to_string(),
        messages: vec![ChatTurn {
            role: ChatRole::User,
            content: body,
        }],
    }
}

/// Builds a chat request: the last [`MAX_HISTORY_TURNS`] of `history`, then
/// the new `message` with a context block of recommendations and the events
/// for any tickers it mentions.
pub fn chat_prompt(
    message: &str,
    history: &[ChatTurn],
    recs: &[ScoredRecommendation],
    ticker_events: &[RatingEvent],
) -> CompletionRequest {
    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut messages: Vec<ChatTurn> = history
        .iter()
        .skip(skip)
        .filter(|t| !t.content.trim().is_empty())
        .cloned()
        .collect();

    // The API requires the first message to come from the user.
    while matches!(messages.first(), Some(t) if t.role == ChatRole::Assistant) {
        messages.remove(0);
    }

    let mut content = String::from("<context>\nTop recommendations\n");
    write_recommendations(&mut content, recs);
    if !ticker_events.is_empty() {
        content.push_str("\nRating events for tickers in the question\n");
        for e in ticker_events.iter().take(MAX_CONTEXT_EVENTS) {
            write_event(&mut content, e);
        }
    }
    content.push_str("</context>\n\n");
    content.push_str(message.trim());

    messages.push(ChatTurn {
        role: ChatRole::User,
        content,
    });

    CompletionRequest {
        system: CHAT_SYSTEM.to_string(),
        messages,
    }
}

/// Tickers from `known` that appear as whole words in `message`, matched
/// case-insensitively. Returned sorted and deduplicated.
pub fn mentioned_tickers<'a, I>(message: &str, known: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let words: BTreeSet<String> = message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
        .map(|w| w.trim_matches('.'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect();

    known
        .into_iter()
        .filter(|t| words.contains(&t.to_ascii_uppercase()))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
