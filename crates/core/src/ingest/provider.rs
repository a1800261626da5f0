use crate::config::Settings;
use crate::ingest::types::{UpstreamEnvelope, UpstreamPage};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fetches one page of rating items. Transport and decode failures are
    /// errors; a non-2xx status is an empty page carrying that status.
    async fn fetch_page(&self, page: u32) -> Result<UpstreamPage>;
}

#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    http: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpUpstreamClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings.require_upstream_api_url()?.to_string();
        let api_token = settings.upstream_api_token.clone();

        let timeout_secs = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build upstream http client")?;

        Ok(Self {
            http,
            url,
            api_token,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.api_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("upstream token is not a valid header value")?,
            );
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl UpstreamClient for HttpUpstreamClient {
    fn provider_name(&self) -> &'static str {
        "upstream_http_json"
    }

    async fn fetch_page(&self, page: u32) -> Result<UpstreamPage> {
        let res = self
            .http
            .get(&self.url)
            .headers(self.headers()?)
            .query(&[("next_page", page.to_string())])
            .send()
            .await
            .with_context(|| format!("upstream request failed (page={page})"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read upstream response (page={page})"))?;

        if !status.is_success() {
            tracing::warn!(page, http_status = %status, "upstream returned non-2xx; treating as empty page");
            return Ok(UpstreamPage {
                status: status.as_u16(),
                items: Vec::new(),
                next_page: String::new(),
            });
        }

        let envelope = serde_json::from_str::<UpstreamEnvelope>(&text)
            .with_context(|| format!("upstream response is not a valid listing (page={page}): {text}"))?;

        Ok(UpstreamPage {
            status: status.as_u16(),
            items: envelope.items,
            next_page: envelope.next_page,
        })
    }
}
