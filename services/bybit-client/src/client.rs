use crate::types::*;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

const LIST_BOTS_PATH: &str = "/s1/bot/tradingbot/v1/list-all-bots";
const DEFAULT_BASE_URL: &str = "https://api2.bybit.com";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

/// Connection settings for the brokerage web API
#[derive(Clone)]
pub struct BybitClientConfig {
    pub secure_token: String,
    pub device_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl BybitClientConfig {
    pub fn new(secure_token: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            secure_token: secure_token.into(),
            device_id: device_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for BybitClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClientConfig")
            .field("secure_token", &"<redacted>")
            .field("device_id", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Internal health tracking for API-free health checks
struct HealthTracker {
    /// Timestamp of last successful request (millis since epoch)
    last_success_ms: AtomicU64,
    /// Timestamp of last failed request (millis since epoch)
    last_failure_ms: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl HealthTracker {
    fn new() -> Self {
        Self {
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    fn record_success(&self, latency_ms: u64) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_failure_ms.store(now_ms, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self) -> bool {
        let last_success = self.last_success_ms.load(Ordering::Relaxed);
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);

        // Healthy if: had at least one success AND (no failures OR last success >= last failure)
        last_success > 0 && (last_failure == 0 || last_success >= last_failure)
    }

    fn success_rate(&self) -> f64 {
        let successes = self.success_count.load(Ordering::Relaxed);
        let failures = self.failure_count.load(Ordering::Relaxed);
        let total = successes + failures;
        if total == 0 {
            return 1.0;
        }
        successes as f64 / total as f64
    }
}

/// Client for the brokerage's cookie-authenticated bot listing
pub struct BybitClient {
    client: Client,
    list_url: Url,
    timeout: Duration,
    health_tracker: HealthTracker,
}

impl BybitClient {
    pub fn new(config: BybitClientConfig) -> Result<Self> {
        let list_url = Url::parse(&config.base_url)
            .and_then(|base| base.join(LIST_BOTS_PATH))
            .map_err(|e| BybitError::Config(format!("invalid base url {}: {}", config.base_url, e)))?;

        let client = Client::builder()
            .default_headers(default_headers(&config)?)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BybitError::Config(e.to_string()))?;

        Ok(Self {
            client,
            list_url,
            timeout: config.timeout,
            health_tracker: HealthTracker::new(),
        })
    }

    /// POST the list-all-bots query and hand back the raw envelope.
    ///
    /// The envelope's own `retCode` is not inspected here; a 200 response with
    /// a brokerage-level rejection is still `Ok`.
    pub async fn list_bots(&self, request: &ListBotsRequest) -> Result<Value> {
        let request_start = Instant::now();

        // Explicit outer timeout so a stalled body read cannot outlive the budget
        let request_future = self.client.post(self.list_url.clone()).json(request).send();
        let response = match tokio::time::timeout(self.timeout, request_future).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => {
                self.health_tracker.record_failure();
                return Err(BybitError::Timeout { millis: self.timeout.as_millis() as u64 });
            }
            Ok(Err(e)) => {
                self.health_tracker.record_failure();
                return Err(BybitError::Request(e.to_string()));
            }
            Err(_) => {
                self.health_tracker.record_failure();
                return Err(BybitError::Timeout { millis: self.timeout.as_millis() as u64 });
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.health_tracker.record_failure();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Bybit list-all-bots rejected");
            return Err(BybitError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = response.json::<Value>().await.map_err(|e| {
            self.health_tracker.record_failure();
            BybitError::InvalidResponse(e.to_string())
        })?;

        let latency_ms = request_start.elapsed().as_millis() as u64;
        self.health_tracker.record_success(latency_ms);
        tracing::debug!(
            page = request.page,
            limit = request.limit,
            latency_ms,
            "Fetched bot envelope from Bybit"
        );

        Ok(envelope)
    }

    /// Cheap liveness probe: a one-item listing that must come back with a success code
    pub async fn check_api_status(&self) -> Result<bool> {
        let envelope = self
            .list_bots(&ListBotsRequest {
                limit: 1,
                ..ListBotsRequest::default()
            })
            .await?;

        Ok(EnvelopeStatus::read(&envelope)
            .map(|s| s.is_success())
            .unwrap_or(false))
    }

    /// Get health status using internal metrics (no API call)
    pub async fn health(&self) -> SourceHealth {
        let last_success_ms = self.health_tracker.last_success_ms.load(Ordering::Relaxed);
        let last_success = if last_success_ms > 0 {
            DateTime::from_timestamp_millis(last_success_ms as i64)
        } else {
            None
        };

        let is_healthy = self.health_tracker.is_healthy();

        SourceHealth {
            source: self.name().to_string(),
            is_healthy,
            last_success,
            last_error: if is_healthy || self.health_tracker.failure_count.load(Ordering::Relaxed) == 0 {
                None
            } else {
                Some("Recent failures detected".to_string())
            },
            success_rate: self.health_tracker.success_rate(),
            last_latency_ms: self.health_tracker.last_latency_ms.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        "bybit"
    }
}

fn default_headers(config: &BybitClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert(header::ORIGIN, HeaderValue::from_static("https://www.bybit.com"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.bybit.com/"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

    let mut cookie = HeaderValue::from_str(&format!(
        "secure-token={}; deviceId={}",
        config.secure_token, config.device_id
    ))
    .map_err(|_| BybitError::Config("credentials contain invalid header characters".to_string()))?;
    cookie.set_sensitive(true);
    headers.insert(header::COOKIE, cookie);

    Ok(headers)
}

#[async_trait::async_trait]
impl BotSource for BybitClient {
    async fn fetch_bots(&self, request: &ListBotsRequest) -> Result<Value> {
        BybitClient::list_bots(self, request).await
    }

    async fn check_api_status(&self) -> Result<bool> {
        BybitClient::check_api_status(self).await
    }

    async fn health(&self) -> SourceHealth {
        BybitClient::health(self).await
    }

    fn name(&self) -> &str {
        "bybit"
    }
}
