use crate::app::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockrate_core::error::InvalidInput;
use stockrate_core::llm::prompt::{chat_prompt, mentioned_tickers, summary_prompt, MAX_CONTEXT_EVENTS};
use stockrate_core::llm::ChatTurn;
use stockrate_core::scoring;
use stockrate_core::storage::metrics::stock_metrics;
use stockrate_core::storage::ratings;

const SUMMARY_RECOMMENDATIONS: usize = 10;
const CHAT_RECOMMENDATIONS: usize = 5;
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub tokens_used: u32,
    pub generated_at: DateTime<Utc>,
}

pub async fn summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>, ApiError> {
    let pool = state.pool()?;
    let llm = state.llm()?;

    let now = Utc::now();
    let (events, metrics) = tokio::try_join!(ratings::all_events(pool), stock_metrics(pool, now))?;
    let recs = scoring::recommend(&events, &state.weights, now, SUMMARY_RECOMMENDATIONS);

    let completion = llm.complete(summary_prompt(&recs, &metrics)).await?;
    tracing::info!(
        provider = ?llm.provider(),
        tokens_used = completion.tokens_used,
        recommendations = recs.len(),
        "generated market summary"
    );

    Ok(Json(SummaryResponse {
        summary: completion.text,
        tokens_used: completion.tokens_used,
        generated_at: now,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl ChatBody {
    fn validate(&self) -> Result<(), InvalidInput> {
        let len = self.message.trim().chars().count();
        if len == 0 {
            return Err(InvalidInput::new("message", "must not be empty"));
        }
        if len > MAX_MESSAGE_CHARS {
            return Err(InvalidInput::new(
                "message",
                format!("must be at most {MAX_MESSAGE_CHARS} characters (got {len})"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub tokens_used: u32,
}

pub async fn chat(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ChatBody>,
) -> Result<Json<ChatResponse>, ApiError> {
    body.validate()?;
    let pool = state.pool()?;
    let llm = state.llm()?;

    let events = ratings::all_events(pool).await?;
    let recs = scoring::recommend(&events, &state.weights, Utc::now(), CHAT_RECOMMENDATIONS);
    let mentioned = mentioned_tickers(
        &body.message,
        scoring::latest_per_ticker(&events)
            .into_iter()
            .map(|(latest, _)| latest.ticker.as_str()),
    );
    let ticker_events =
        ratings::events_for_tickers(pool, &mentioned, MAX_CONTEXT_EVENTS as i64).await?;

    let req = chat_prompt(&body.message, &body.history, &recs, &ticker_events);
    let completion = llm.complete(req).await?;
    tracing::info!(
        provider = ?llm.provider(),
        tokens_used = completion.tokens_used,
        history = body.history.len(),
        ?mentioned,
        "answered chat message"
    );

    Ok(Json(ChatResponse {
        response: completion.text,
        tokens_used: completion.tokens_used,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &str) -> ChatBody {
        ChatBody {
            message: message.to_string(),
            history: Vec::new(),
        }
    }

    #[test]
    fn chat_message_must_be_present_and_bounded() {
        assert!(body("How is AAPL rated?").validate().is_ok());
        assert_eq!(body(" \n ").validate().unwrap_err().field, "message");
        assert!(body(&"x".repeat(MAX_MESSAGE_CHARS)).validate().is_ok());
        assert!(body(&"x".repeat(MAX_MESSAGE_CHARS + 1)).validate().is_err());
    }
}
