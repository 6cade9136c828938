//! Core Types - 공용 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 타입들

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// SecretString - 로그에 노출되지 않는 비밀 값
// ============================================================================

/// A secret value (API key) whose `Debug`/`Display` output is masked.
///
/// The raw value is only reachable through [`SecretString::expose`].
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 원본 값 (HTTP 헤더 등에만 사용)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// 표시용 마스킹 값 (최대 4글자 prefix)
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        if self.0.chars().count() <= 8 {
            "***".to_string()
        } else {
            format!("{}***", prefix)
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString({})", self.masked())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Credential
// ============================================================================

/// Credential 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 표시용 짧은 ID
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl Default for CredentialId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CredentialId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CredentialId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential 상태
///
/// Active → Exhausted is monotonic; only an external re-donation moves a
/// credential back to Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Exhausted,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "exhausted" => Some(Self::Exhausted),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rotating model API credential.
///
/// `version` is bumped on every persisted change and used for
/// compare-and-swap at the storage boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: CredentialId,
    pub secret: SecretString,
    pub status: CredentialStatus,
    /// `None` = never used (sorts before every timestamp)
    pub last_used_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Credential {
    /// 새 Active credential
    pub fn new(secret: impl Into<SecretString>) -> Self {
        Self {
            id: CredentialId::new(),
            secret: secret.into(),
            status: CredentialStatus::Active,
            last_used_at: None,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }

    // 빌더
    pub fn with_id(mut self, id: impl Into<CredentialId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_last_used(mut self, at: DateTime<Utc>) -> Self {
        self.last_used_at = Some(at);
        self
    }

    pub fn exhausted(mut self) -> Self {
        self.status = CredentialStatus::Exhausted;
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &self.secret)
            .field("status", &self.status)
            .field("last_used_at", &self.last_used_at)
            .field("version", &self.version)
            .finish()
    }
}

// ============================================================================
// Session Context
// ============================================================================

/// Session-scoped context threaded through every pipeline call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// 세션 식별자 (채팅 기록과 연결)
    pub session_id: String,

    /// 대상 브랜치 (e.g. "main")
    pub branch: String,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            branch: branch.into(),
        }
    }

    /// 새 세션 ID로 생성
    pub fn fresh(branch: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), branch)
    }
}
