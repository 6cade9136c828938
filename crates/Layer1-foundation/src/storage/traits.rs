//! 저장소 경계 트레이트

use crate::core::{Credential, SecretString};
use crate::Result;
use std::fmt;

/// Durable credential records.
///
/// Writes go through [`CredentialStore::compare_and_swap`], which only
/// succeeds when the stored version still equals `expected_version`.
pub trait CredentialStore: Send + Sync {
    /// All credentials, ordered by `last_used_at` (never-used first).
    fn list_credentials(&self) -> Result<Vec<Credential>>;

    /// Insert a new credential record.
    fn insert_credential(&self, credential: &Credential) -> Result<()>;

    fn find_by_secret(&self, secret: &SecretString) -> Result<Option<Credential>>;

    /// Persist `credential` (status, last_used_at, version) if the stored
    /// version is `expected_version`. Returns `false` on a lost race.
    fn compare_and_swap(&self, credential: &Credential, expected_version: i64) -> Result<bool>;
}

/// 채팅 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat transcript collaborator. The pipeline itself never writes here.
pub trait ChatHistory: Send + Sync {
    /// Append a message, creating the session record on first use.
    fn append(
        &self,
        session_id: &str,
        branch: &str,
        role: ChatRole,
        content: &str,
        commit_sha: Option<&str>,
    ) -> Result<()>;
}
