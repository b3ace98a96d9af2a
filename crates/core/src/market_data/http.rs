use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Shared HTTP client with retry and exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;
        Ok(Self { http, retries })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            Duration::from_secs(settings.data_provider_timeout_secs),
            settings.data_provider_retries,
        )
    }

    /// Sends the request built by `build`, retrying transport errors, 429 and 5xx.
    pub async fn bytes<F>(&self, label: &str, build: F) -> Result<Vec<u8>>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let max_attempts = self.retries.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let res = match build(&self.http).send().await {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= max_attempts {
                        return Err(err).with_context(|| format!("{label} request failed"));
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "{label} request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let body = res
                .bytes()
                .await
                .with_context(|| format!("failed to read {label} response"))?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempt < max_attempts {
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, http_status = %status, "{label} HTTP error; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                let preview = String::from_utf8_lossy(&body[..body.len().min(200)]);
                anyhow::bail!("{label} HTTP {status}: {preview}");
            }

            return Ok(body.to_vec());
        }
    }

    pub async fn text<F>(&self, label: &str, build: F) -> Result<String>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let body = self.bytes(label, build).await?;
        String::from_utf8(body).with_context(|| format!("{label} response is not UTF-8"))
    }
}
