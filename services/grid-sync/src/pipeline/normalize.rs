//! Batch normalization: envelope status check, container probing, per-entry extraction

use bybit_client::EnvelopeStatus;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::extract::{extract_at, ExtractError};
use crate::models::NormalizedBot;

/// Code reported when the envelope cannot be interpreted at all
pub const INVALID_STRUCTURE_CODE: i64 = -1;

/// Why a batch was rejected before any record was looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFailureKind {
    AuthenticationFailed,
    Rejected,
    InvalidStructure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub code: i64,
    pub message: String,
    pub kind: ApiFailureKind,
}

impl ApiFailure {
    fn invalid_structure() -> Self {
        Self {
            code: INVALID_STRUCTURE_CODE,
            message: "invalid response structure".to_string(),
            kind: ApiFailureKind::InvalidStructure,
        }
    }
}

/// Candidates that survived extraction, plus bookkeeping for the report
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub bots: Vec<NormalizedBot>,
    /// Entries found in the container
    pub received: usize,
    /// Entries dropped by the extractor
    pub failures: usize,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    ApiError(ApiFailure),
    Success(NormalizedBatch),
}

/// Normalize one envelope, stamping every record with the current time
pub fn normalize(envelope: &Value) -> BatchResult {
    normalize_at(envelope, Utc::now())
}

/// Normalize one envelope with an explicit sync timestamp.
///
/// All records of a batch share the same `last_synced_at`.
pub fn normalize_at(envelope: &Value, synced_at: DateTime<Utc>) -> BatchResult {
    let status = match EnvelopeStatus::read(envelope) {
        Some(status) => status,
        None => {
            warn!("Envelope status code is not an integer");
            return BatchResult::ApiError(ApiFailure::invalid_structure());
        }
    };

    if !status.is_success() {
        let kind = if status.is_auth_failure() {
            ApiFailureKind::AuthenticationFailed
        } else {
            ApiFailureKind::Rejected
        };
        warn!(code = status.code, message = %status.message, ?kind, "Brokerage rejected the request");
        return BatchResult::ApiError(ApiFailure {
            code: status.code,
            message: status.message,
            kind,
        });
    }

    let Some(entries) = locate_entries(envelope) else {
        warn!("No bot list found in envelope");
        return BatchResult::ApiError(ApiFailure::invalid_structure());
    };

    let mut bots = Vec::with_capacity(entries.len());
    let mut failures = 0;

    for (index, entry) in entries.iter().enumerate() {
        match extract_at(entry, synced_at) {
            Ok(bot) => bots.push(bot),
            Err(err) => {
                failures += 1;
                log_extract_failure(index, entry, &err);
            }
        }
    }

    BatchResult::Success(NormalizedBatch {
        bots,
        received: entries.len(),
        failures,
    })
}

/// Probe `result.bots`, then `result.list`, then `result` itself
fn locate_entries(envelope: &Value) -> Option<&Vec<Value>> {
    let result = envelope.get("result")?;

    ["bots", "list"]
        .iter()
        .find_map(|key| result.get(*key).and_then(Value::as_array))
        .or_else(|| result.as_array())
}

fn log_extract_failure(index: usize, entry: &Value, err: &ExtractError) {
    warn!(index, error = %err, raw_entry = %entry, "Skipping bot entry that failed extraction");
}
