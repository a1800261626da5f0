use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    /// The provider's own error message. Falls back to the raw body when it
    /// was not a JSON error envelope (proxies and load balancers).
    pub fn upstream_message(&self) -> Option<&str> {
        let from_json = self
            .raw_response_json
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(Value::as_str);
        from_json.or_else(|| {
            self.raw_output
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )?;
        if let Some(msg) = self.upstream_message() {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LlmDiagnosticsError {}
