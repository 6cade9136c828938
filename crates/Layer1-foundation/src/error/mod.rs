//! Error types for vibeship
//!
//! 모든 에러를 중앙에서 관리합니다. 파이프라인 실행 중 발생하는 에러는
//! 모두 현재 실행에 대해 terminal이며, 호출자에게 그대로 전달됩니다.

use crate::core::ProposalError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// vibeship 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Credential pool
    // ========================================================================
    /// The pool holds no Active credential (or the rotation bound ran out).
    #[error("No credentials available in the pool")]
    NoCredentialsAvailable,

    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    #[error("Upstream rejected credential: {0}")]
    UpstreamInvalidCredential(String),

    // ========================================================================
    // Pipeline
    // ========================================================================
    #[error("Invalid proposal: {0}")]
    InvalidProposal(#[from] ProposalError),

    /// The branch moved between head resolution and ref update.
    #[error("Ref conflict on {branch}: expected {expected}, found {}", .found.as_deref().unwrap_or("<unknown>"))]
    RefConflict {
        branch: String,
        expected: String,
        found: Option<String>,
    },

    #[error("Transient network failure: {0}")]
    TransientNetworkFailure(String),

    #[error("Session mismatch: {0}")]
    SessionMismatch(String),

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// Pipeline errors are terminal for the current run; a failed run is
    /// restarted from the beginning by the caller, never resumed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NoCredentialsAvailable
                | Error::InvalidProposal(_)
                | Error::RefConflict { .. }
                | Error::SessionMismatch(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
        )
    }

    /// Whether the remote repository may have received orphaned objects.
    pub fn leaves_orphans(&self) -> bool {
        matches!(self, Error::RefConflict { .. })
    }

    /// RefConflict 생성 헬퍼
    pub fn ref_conflict(
        branch: impl Into<String>,
        expected: impl Into<String>,
        found: Option<String>,
    ) -> Self {
        Error::RefConflict {
            branch: branch.into(),
            expected: expected.into(),
            found,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_conflict_display() {
        let err = Error::ref_conflict("main", "abc123", Some("def456".to_string()));
        assert_eq!(
            err.to_string(),
            "Ref conflict on main: expected abc123, found def456"
        );

        let err = Error::ref_conflict("main", "abc123", None);
        assert!(err.to_string().ends_with("found <unknown>"));
    }

    #[test]
    fn test_pipeline_errors_not_retryable() {
        assert!(!Error::NoCredentialsAvailable.is_retryable());
        assert!(!Error::TransientNetworkFailure("timeout".into()).is_retryable());
        assert!(!Error::ref_conflict("main", "a", None).is_retryable());
    }

    #[test]
    fn test_invalid_proposal_from() {
        let err: Error = ProposalError::MissingKey("code").into();
        assert!(matches!(err, Error::InvalidProposal(_)));
        assert!(err.is_user_facing());
    }
}
