//! Provider-specific error types
//!
//! ProviderError는 모델 API 관련 세부 에러를 관리합니다.
//! vibe_foundation::Error와의 변환을 지원합니다.

use crate::rotation::{FailureClass, RotatableError};
use thiserror::Error;
use vibe_foundation::Error as FoundationError;

/// Errors that can occur during a model invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// API key is missing, invalid, or revoked
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit or quota exceeded for this key
    #[error("Rate limit exceeded{}", .retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// Content was filtered
    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    /// Server error (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Network error (connection failed, DNS, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Per-call timeout elapsed
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Invalid request (bad parameters)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid response from API
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RotatableError for ProviderError {
    fn classify(&self) -> FailureClass {
        match self {
            // Key hit its quota - rotate
            ProviderError::RateLimited { .. } => FailureClass::RateLimited,

            // Key rejected - rotate
            ProviderError::Authentication(_) => FailureClass::InvalidCredential,

            // Everything else is not a credential problem
            ProviderError::ContentFiltered(_)
            | ProviderError::ServerError(_)
            | ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::Unknown(_) => FailureClass::Fatal,
        }
    }
}

impl ProviderError {
    /// Create from HTTP status code and body
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication(body.to_string()),
            429 => ProviderError::RateLimited {
                retry_after_ms: extract_retry_after(body),
            },
            400 => {
                if is_invalid_key_message(body) {
                    ProviderError::Authentication(body.to_string())
                } else {
                    ProviderError::InvalidRequest(body.to_string())
                }
            }
            404 => ProviderError::ModelNotFound(body.to_string()),
            408 | 504 => ProviderError::Timeout(body.to_string()),
            500..=599 => ProviderError::ServerError(body.to_string()),
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Map a transport failure from reqwest
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Gemini answers a bad key with 400 rather than 401.
pub(crate) fn is_invalid_key_message(body: &str) -> bool {
    body.contains("API_KEY_INVALID") || body.contains("API key not valid")
}

/// Try to extract retry-after value from error body (in milliseconds)
fn extract_retry_after(body: &str) -> Option<u64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(secs) = json
            .get("error")
            .and_then(|e| e.get("retry_after"))
            .and_then(|v| v.as_f64())
        {
            return Some((secs * 1000.0) as u64);
        }
    }

    if let Some(idx) = body.find("retry") {
        let after = &body[idx..];
        let num_str: String = after
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        if let Ok(secs) = num_str.parse::<f64>() {
            return Some((secs * 1000.0) as u64);
        }
    }

    None
}

// ============================================================================
// vibe_foundation::Error 변환
// ============================================================================

impl From<ProviderError> for FoundationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => {
                FoundationError::UpstreamRateLimited(err.to_string())
            }
            ProviderError::Authentication(msg) => FoundationError::UpstreamInvalidCredential(msg),
            other => FoundationError::TransientNetworkFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ProviderError::from_http_status(429, "slow down").classify(),
            FailureClass::RateLimited
        );
        assert_eq!(
            ProviderError::from_http_status(403, "denied").classify(),
            FailureClass::InvalidCredential
        );
        assert_eq!(
            ProviderError::from_http_status(400, "API key not valid. Please pass a valid API key.")
                .classify(),
            FailureClass::InvalidCredential
        );
        assert_eq!(
            ProviderError::from_http_status(400, "bad field").classify(),
            FailureClass::Fatal
        );
        assert_eq!(
            ProviderError::from_http_status(503, "overloaded").classify(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_retry_after_extraction() {
        let err = ProviderError::from_http_status(429, r#"{"error":{"retry_after":1.5}}"#);
        assert_eq!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: Some(1500)
            }
        );
    }

    #[test]
    fn test_foundation_conversion() {
        let err: FoundationError = ProviderError::Timeout("60s".into()).into();
        assert!(matches!(err, FoundationError::TransientNetworkFailure(_)));

        let err: FoundationError = ProviderError::Authentication("bad key".into()).into();
        assert!(matches!(err, FoundationError::UpstreamInvalidCredential(_)));

        let err: FoundationError = ProviderError::RateLimited {
            retry_after_ms: None,
        }
        .into();
        assert!(matches!(err, FoundationError::UpstreamRateLimited(_)));
    }
}
