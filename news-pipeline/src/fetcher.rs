use crate::types::{FetchConfig, FetchResult, PipelineError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP side of feed retrieval: retries with exponential backoff, per-host spacing
/// and a size cap. Never returns `Err` for network trouble, only a failed `FetchResult`.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn fetch_feed(&self, source_name: &str, url: &str) -> Result<FetchResult> {
        let start_time = Instant::now();
        let fetch_time = Utc::now();

        debug!("Fetching feed: {} ({})", url, source_name);

        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let failed = |error: String, http_status: Option<u16>| FetchResult {
            source_name: source_name.to_string(),
            success: false,
            error: Some(error),
            fetch_time,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            http_status,
            content: None,
        };

        let mut last_error = None;
        let mut last_status = None;

        for attempt in 0..=self.config.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());

                    if !status.is_success() {
                        last_error = Some(format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ));

                        // Client errors will not fix themselves.
                        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                            break;
                        }
                    } else {
                        if let Some(content_length) = response.content_length() {
                            let size_mb = content_length as usize / (1024 * 1024);
                            if size_mb > self.config.max_feed_size_mb {
                                return Ok(failed(format!("Feed too large: {}MB", size_mb), last_status));
                            }
                        }

                        match response.text().await {
                            Ok(content) if content.trim().is_empty() => {
                                warn!("Empty payload from {}", url);
                                return Ok(failed("Empty payload".to_string(), last_status));
                            }
                            Ok(content) => {
                                info!("Successfully fetched feed: {} ({} bytes)", url, content.len());
                                return Ok(FetchResult {
                                    source_name: source_name.to_string(),
                                    success: true,
                                    error: None,
                                    fetch_time,
                                    response_time_ms: start_time.elapsed().as_millis() as u64,
                                    http_status: last_status,
                                    content: Some(content),
                                });
                            }
                            Err(e) => {
                                last_error = Some(PipelineError::Http(e).to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(PipelineError::Http(e).to_string());
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        let error_msg = last_error.unwrap_or_else(|| "Unknown error".to_string());
        error!("Failed to fetch feed {}: {}", url, error_msg);

        Ok(failed(error_msg, last_status))
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();

        let now = Instant::now();
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        let mut rate_limiter = self.rate_limiter.lock().await;
        if let Some(last_request) = rate_limiter.get(&host) {
            let elapsed = now.duration_since(*last_request);
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        rate_limiter.insert(host, Instant::now());

        Ok(())
    }
}
