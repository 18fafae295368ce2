use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use tracing::{debug, warn};

use crate::error::{AttemptError, FetchError};
use crate::settings::Settings;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Source of page markup and image bytes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Linear backoff: attempt `n` (0-based) waits `base + step * n` before the next try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base: Duration::from_millis(settings.retry_base_ms),
            step: Duration::from_millis(settings.retry_step_ms),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base + self.step * attempt
    }
}

/// Plain GET client with browser headers and per-request timeouts.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    page_timeout: Duration,
    image_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers(settings)?)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            retry: RetryPolicy::from_settings(settings),
            page_timeout: settings.page_timeout(),
            image_timeout: settings.image_timeout(),
        })
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, AttemptError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }
        Ok(response)
    }

    async fn with_retries<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(FetchError {
                            url: url.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let backoff = self.retry.delay_for(attempt - 1);
                    warn!(
                        "GET {} failed (attempt {}/{}): {}, retrying in {:.1}s",
                        url,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching page {}", url);
        self.with_retries(url, move || async move {
            let response = self.send(url, self.page_timeout).await?;
            Ok::<_, AttemptError>(response.text().await?)
        })
        .await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching image {}", url);
        self.with_retries(url, move || async move {
            let response = self.send(url, self.image_timeout).await?;
            Ok::<_, AttemptError>(response.bytes().await?.to_vec())
        })
        .await
    }
}

fn browser_headers(settings: &Settings) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&settings.user_agent).context("Invalid user agent")?,
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&settings.accept_language).context("Invalid accept-language")?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(headers)
}

/// Page 1 is the base URL; pages 2..=n append `page=<n>`.
///
/// The site has never been confirmed to honour `page=`. When it ignores it,
/// every extra page repeats page 1 and dedupe absorbs the copies.
pub fn page_urls(base_url: &str, pages: u32) -> Vec<String> {
    let mut urls = vec![base_url.to_string()];
    if pages <= 1 {
        return urls;
    }
    let sep = if base_url.contains('?') { '&' } else { '?' };
    urls.extend((2..=pages).map(|p| format!("{}{}page={}", base_url, sep, p)));
    urls
}
