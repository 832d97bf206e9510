//! The sync pipeline: fetch → normalize → reconcile → report

pub mod extract;
pub mod normalize;
pub mod reconcile;
pub mod report;

use std::sync::Arc;
use std::time::Instant;

use bybit_client::{BotSource, ListBotsRequest};
use serde_json::Value;
use tracing::{error, info};

use crate::db::BotStore;
use crate::observability::{metrics, Logger, MetricsCollector};

pub use extract::{extract, extract_at, ExtractError, Field};
pub use normalize::{normalize, normalize_at, ApiFailure, ApiFailureKind, BatchResult, NormalizedBatch};
pub use reconcile::{plan, stage, ReconcileError, ReconcileOutcome, ReconcilePlan, Reconciler, StageError, Step};
pub use report::{report, SyncReport};

/// Runs one sync per call against a bot source and a store
pub struct SyncService<S> {
    source: Arc<dyn BotSource>,
    reconciler: Reconciler<S>,
    metrics: MetricsCollector,
}

impl<S: BotStore> SyncService<S> {
    pub fn new(source: Arc<dyn BotSource>, store: S, metrics: MetricsCollector) -> Self {
        Self {
            source,
            reconciler: Reconciler::new(store),
            metrics,
        }
    }

    /// Fetch one page from the source and push it through the pipeline
    pub async fn sync(&self, request: &ListBotsRequest) -> SyncReport {
        let started = Instant::now();
        info!(
            source = self.source.name(),
            page = request.page,
            limit = request.limit,
            status = request.status,
            "Starting bot sync"
        );

        let report = match self.source.fetch_bots(request).await {
            Ok(envelope) => self.process(&envelope).await,
            Err(err) => {
                error!(source = self.source.name(), error = %err, "Fetching bots failed");
                SyncReport::transport_failure(&err)
            }
        };

        self.record(&report, started).await;
        report
    }

    /// Run an already-fetched envelope through normalize → reconcile → report
    pub async fn process(&self, envelope: &Value) -> SyncReport {
        let batch = normalize(envelope);

        let outcome = match &batch {
            BatchResult::Success(normalized) => {
                if normalized.failures > 0 {
                    self.metrics
                        .increment(metrics::EXTRACT_FAILURES, normalized.failures as u64)
                        .await;
                }
                if normalized.is_empty() {
                    None
                } else {
                    Some(self.reconciler.reconcile(normalized.bots.clone()).await)
                }
            }
            BatchResult::ApiError(_) => None,
        };

        report(batch, outcome)
    }

    async fn record(&self, report: &SyncReport, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.metrics.increment(metrics::SYNC_RUNS, 1).await;
        self.metrics
            .histogram(metrics::SYNC_DURATION_MS, duration_ms as f64)
            .await;

        match report {
            SyncReport::Success {
                synced_count,
                inserted,
                updated,
                skipped,
                message,
            } => {
                self.metrics.increment(metrics::SYNC_SUCCESS, 1).await;
                self.metrics.increment(metrics::BOTS_INSERTED, *inserted as u64).await;
                self.metrics.increment(metrics::BOTS_UPDATED, *updated as u64).await;
                self.metrics.increment(metrics::BOTS_SKIPPED, *skipped as u64).await;
                self.metrics.gauge(metrics::LAST_SYNC_COUNT, *synced_count as f64).await;
                Logger::sync_event(report.kind(), *synced_count, duration_ms, message);
            }
            SyncReport::ApiError { message, .. } => {
                self.metrics.increment(metrics::SYNC_API_ERRORS, 1).await;
                Logger::sync_event(report.kind(), 0, duration_ms, message);
            }
            SyncReport::PersistenceError { message, .. } => {
                self.metrics.increment(metrics::SYNC_PERSISTENCE_ERRORS, 1).await;
                Logger::sync_event(report.kind(), 0, duration_ms, message);
            }
            SyncReport::SyncError { message, .. } => {
                self.metrics.increment(metrics::SYNC_ERRORS, 1).await;
                Logger::sync_event(report.kind(), 0, duration_ms, message);
            }
        }
    }
}
