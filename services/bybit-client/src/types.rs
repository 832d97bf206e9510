use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope code the brokerage uses for "OK"
pub const SUCCESS_CODE: i64 = 0;

/// Envelope codes that mean the session cookie was rejected
/// (invalid key, bad signature, permission denied, login required, key expired)
pub const AUTH_FAILURE_CODES: &[i64] = &[10003, 10004, 10005, 10007, 33004];

/// Keys probed for the envelope status code, in priority order
pub const CODE_KEYS: &[&str] = &["retCode", "ret_code"];

/// Keys probed for the envelope status message, in priority order
pub const MESSAGE_KEYS: &[&str] = &["retMsg", "ret_msg"];

/// Body of the list-all-bots request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBotsRequest {
    pub status: i32,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListBotsRequest {
    fn default() -> Self {
        Self {
            status: 0,
            page: 0,
            limit: 150,
        }
    }
}

/// Status code/message pair carried by every brokerage envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeStatus {
    pub code: i64,
    pub message: String,
}

impl EnvelopeStatus {
    /// Read the status pair from a raw envelope.
    ///
    /// An envelope without any status key is treated as successful (the older
    /// `result.bots` shape omits it). Returns `None` when a status key is
    /// present but does not hold an integer.
    pub fn read(envelope: &Value) -> Option<Self> {
        let message = MESSAGE_KEYS
            .iter()
            .find_map(|key| envelope.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let raw_code = CODE_KEYS
            .iter()
            .find_map(|key| envelope.get(*key).filter(|v| !v.is_null()));

        let code = match raw_code {
            None => SUCCESS_CODE,
            Some(Value::Number(n)) => n.as_i64()?,
            Some(Value::String(s)) => s.trim().parse().ok()?,
            Some(_) => return None,
        };

        Some(Self { code, message })
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn is_auth_failure(&self) -> bool {
        AUTH_FAILURE_CODES.contains(&self.code)
    }
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub last_latency_ms: u64,
}

/// Error types for brokerage calls
#[derive(Debug, thiserror::Error)]
pub enum BybitError {
    #[error("API request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl BybitError {
    /// HTTP status of the upstream failure, if the brokerage answered at all
    pub fn http_status(&self) -> Option<u16> {
        match self {
            BybitError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for brokerage operations
pub type Result<T> = std::result::Result<T, BybitError>;

/// Anything that can produce one page of raw bot envelopes
#[async_trait::async_trait]
pub trait BotSource: Send + Sync {
    /// Fetch one page of bots as the untouched JSON envelope
    async fn fetch_bots(&self, request: &ListBotsRequest) -> Result<Value>;

    /// Live probe against the upstream; `true` when it answers with a success code
    async fn check_api_status(&self) -> Result<bool>;

    /// Source health derived from recent calls
    async fn health(&self) -> SourceHealth;

    /// Source name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_camel_case_envelope() {
        let status = EnvelopeStatus::read(&json!({"retCode": 0, "retMsg": "OK"})).unwrap();
        assert!(status.is_success());
        assert_eq!(status.message, "OK");
    }

    #[test]
    fn test_status_snake_case_string_code() {
        let status = EnvelopeStatus::read(&json!({"ret_code": "10007", "ret_msg": "login"})).unwrap();
        assert_eq!(status.code, 10007);
        assert!(status.is_auth_failure());
        assert!(!status.is_success());
    }

    #[test]
    fn test_status_absent_is_success() {
        let status = EnvelopeStatus::read(&json!({"result": {"bots": []}})).unwrap();
        assert_eq!(status.code, SUCCESS_CODE);
        assert!(status.message.is_empty());
    }

    #[test]
    fn test_status_garbage_code() {
        assert!(EnvelopeStatus::read(&json!({"retCode": "abc"})).is_none());
        assert!(EnvelopeStatus::read(&json!({"retCode": [1]})).is_none());
    }

    #[test]
    fn test_non_auth_rejection() {
        let status = EnvelopeStatus::read(&json!({"retCode": 10001, "retMsg": "params error"})).unwrap();
        assert!(!status.is_success());
        assert!(!status.is_auth_failure());
    }

    #[test]
    fn test_default_request() {
        let req = ListBotsRequest::default();
        assert_eq!(serde_json::to_value(req).unwrap(), json!({"status": 0, "page": 0, "limit": 150}));
    }
}
