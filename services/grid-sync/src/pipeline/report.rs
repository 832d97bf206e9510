//! Outcome reporting: exactly one `SyncReport` per pipeline run

use bybit_client::BybitError;
use serde::{Deserialize, Serialize};

use super::normalize::BatchResult;
use super::reconcile::{ReconcileError, ReconcileOutcome};

/// Code used when the pipeline could not account for a batch it was handed
pub const INTERNAL_CODE: &str = "internal";

/// Code used when the brokerage call failed without an HTTP status
pub const TRANSPORT_FAILURE_CODE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncReport {
    Success {
        synced_count: usize,
        inserted: usize,
        updated: usize,
        skipped: usize,
        message: String,
    },
    ApiError {
        code: i64,
        message: String,
    },
    PersistenceError {
        code: String,
        message: String,
    },
    SyncError {
        code: String,
        message: String,
    },
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncReport::Success { .. })
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SyncReport::Success { .. } => "success",
            SyncReport::ApiError { .. } => "api_error",
            SyncReport::PersistenceError { .. } => "persistence_error",
            SyncReport::SyncError { .. } => "sync_error",
        }
    }

    /// The brokerage call itself failed; no envelope was produced
    pub fn transport_failure(err: &BybitError) -> Self {
        SyncReport::ApiError {
            code: err.http_status().map(i64::from).unwrap_or(TRANSPORT_FAILURE_CODE),
            message: err.to_string(),
        }
    }
}

/// Fold a normalized batch and the reconciliation it led to (if any) into a report.
///
/// `outcome` is `None` when reconciliation was not attempted, which is only
/// legitimate for rejected envelopes and batches with nothing to write.
pub fn report(batch: BatchResult, outcome: Option<Result<ReconcileOutcome, ReconcileError>>) -> SyncReport {
    let batch = match batch {
        BatchResult::ApiError(failure) => {
            return SyncReport::ApiError {
                code: failure.code,
                message: failure.message,
            }
        }
        BatchResult::Success(batch) => batch,
    };

    if batch.is_empty() {
        let message = if batch.failures == 0 {
            "No bots to sync".to_string()
        } else {
            format!("No valid bots to sync ({} entries skipped)", batch.failures)
        };
        return SyncReport::Success {
            synced_count: 0,
            inserted: 0,
            updated: 0,
            skipped: batch.failures,
            message,
        };
    }

    match outcome {
        None => SyncReport::SyncError {
            code: INTERNAL_CODE.to_string(),
            message: format!("{} bots were normalized but never reconciled", batch.bots.len()),
        },
        Some(Err(ReconcileError::Persistence(err))) => SyncReport::PersistenceError {
            code: err.code(),
            message: err.to_string(),
        },
        Some(Err(err @ ReconcileError::Internal(_))) => SyncReport::SyncError {
            code: INTERNAL_CODE.to_string(),
            message: err.to_string(),
        },
        Some(Ok(outcome)) => {
            let skipped = batch.failures + outcome.skipped;
            let mut message = format!(
                "Synced {} bots ({} new, {} updated)",
                outcome.synced(),
                outcome.inserted,
                outcome.updated
            );
            if skipped > 0 {
                message.push_str(&format!(", {skipped} skipped"));
            }
            SyncReport::Success {
                synced_count: outcome.synced(),
                inserted: outcome.inserted,
                updated: outcome.updated,
                skipped,
                message,
            }
        }
    }
}
