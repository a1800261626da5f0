pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod scoring;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub upstream_api_url: Option<String>,
        pub upstream_api_token: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                upstream_api_url: std::env::var("UPSTREAM_API_URL").ok(),
                upstream_api_token: std::env::var("UPSTREAM_API_TOKEN")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_upstream_api_url(&self) -> anyhow::Result<&str> {
            self.upstream_api_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .context("UPSTREAM_API_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }
}
