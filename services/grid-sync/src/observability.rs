//! Observability: tracing setup, in-process sync metrics and structured log events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

/// Third-party targets that are too chatty below `warn`
const QUIET_TARGETS: &[&str] = &["sqlx", "hyper", "reqwest"];

/// Build the log filter: `RUST_LOG` when set, otherwise `log_level`
pub fn env_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directives = std::iter::once(log_level.to_string())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber
pub fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_target(true)
        .init();
}

/// Metrics collector for sync runs
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                gauges: HashMap::new(),
                histograms: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Set a gauge value
    pub async fn gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(name.to_string(), value);
    }

    /// Record a histogram value
    pub async fn histogram(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner.histograms.entry(name.to_string()).or_default().push(value);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            gauges: inner.gauges.clone(),
            histograms: inner
                .histograms
                .iter()
                .map(|(name, values)| (name.clone(), HistogramSummary::from_values(values)))
                .collect(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub histograms: HashMap<String, HistogramSummary>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl HistogramSummary {
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { count: 0, min: 0.0, max: 0.0, mean: 0.0 };
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Self { count: values.len(), min, max, mean }
    }
}

/// Structured logger for sync lifecycle events
pub struct Logger;

impl Logger {
    /// Log the end of one sync run
    pub fn sync_event(outcome: &str, synced_count: usize, duration_ms: u64, message: &str) {
        if outcome == "success" {
            tracing::info!(outcome, synced_count, duration_ms, detail = message, "sync_event");
        } else {
            tracing::warn!(outcome, synced_count, duration_ms, detail = message, "sync_event");
        }
    }

    /// Log a dependency probe result
    pub fn dependency_event(dependency: &str, status: &str) {
        tracing::debug!(dependency, status, "dependency_event");
    }
}

/// Predefined metric names
pub mod metrics {
    // Sync runs
    pub const SYNC_RUNS: &str = "sync_runs_total";
    pub const SYNC_SUCCESS: &str = "sync_success_total";
    pub const SYNC_API_ERRORS: &str = "sync_api_errors_total";
    pub const SYNC_PERSISTENCE_ERRORS: &str = "sync_persistence_errors_total";
    pub const SYNC_ERRORS: &str = "sync_errors_total";
    pub const SYNC_DURATION_MS: &str = "sync_duration_ms";

    // Records
    pub const BOTS_INSERTED: &str = "bots_inserted_total";
    pub const BOTS_UPDATED: &str = "bots_updated_total";
    pub const BOTS_SKIPPED: &str = "bots_skipped_total";
    pub const EXTRACT_FAILURES: &str = "extract_failures_total";

    pub const LAST_SYNC_COUNT: &str = "last_sync_count";
}
