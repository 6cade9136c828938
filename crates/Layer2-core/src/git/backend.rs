//! Version-control object API
//!
//! 원격 저장소의 content-addressed 객체 API (blob / tree / commit / ref).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use vibe_foundation::Error as FoundationError;

/// Regular (non-executable) file mode
pub const FILE_MODE: &str = "100644";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    #[error("Ref not found: {0}")]
    RefNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GitError {
    /// Map a transport failure from reqwest
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            GitError::Timeout(err.to_string())
        } else {
            GitError::Network(err.to_string())
        }
    }
}

impl From<GitError> for FoundationError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RefNotFound(name) => FoundationError::NotFound(format!("ref {}", name)),
            other => FoundationError::TransientNetworkFailure(other.to_string()),
        }
    }
}

// ============================================================================
// Object Types
// ============================================================================

/// Kind of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule
    Commit,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// A single entry of a (recursively listed) tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the repository root
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: String,
}

impl TreeEntry {
    /// Regular file entry pointing at a blob
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: EntryKind::Blob,
            sha: sha.into(),
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// Result of a conditional ref update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdate {
    /// The ref now points at the new commit
    Updated,
    /// The ref no longer pointed at the expected commit; nothing was written
    Conflict { found: Option<String> },
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Remote repository object store.
///
/// Every method is a single remote call. Implementations never retry.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Current commit sha of `branch`
    async fn get_ref(&self, branch: &str) -> Result<String, GitError>;

    /// Tree sha of a commit
    async fn commit_tree(&self, commit_sha: &str) -> Result<String, GitError>;

    /// Recursive listing of the tree at `reference` (branch, commit or tree sha)
    async fn list_tree(&self, reference: &str) -> Result<Vec<TreeEntry>, GitError>;

    /// Store file content; identical content yields the identical sha
    async fn create_blob(&self, content: &str) -> Result<String, GitError>;

    /// New tree = `base_tree` overlaid with `entries`
    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry])
        -> Result<String, GitError>;

    async fn create_commit(
        &self,
        tree_sha: &str,
        parent_sha: &str,
        message: &str,
    ) -> Result<String, GitError>;

    /// Move `branch` from `expected_old` to `new_sha`, never forcing
    async fn update_ref(
        &self,
        branch: &str,
        expected_old: &str,
        new_sha: &str,
    ) -> Result<RefUpdate, GitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_entry_wire_shape() {
        let entry = TreeEntry::blob("src/index.html", "abc");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["mode"], "100644");

        let parsed: TreeEntry = serde_json::from_str(
            r#"{"path":"src","mode":"040000","type":"tree","sha":"def","url":"x"}"#,
        )
        .unwrap();
        assert_eq!(parsed.kind, EntryKind::Tree);
        assert!(!parsed.is_blob());
    }

    #[test]
    fn test_error_conversion() {
        let err: FoundationError = GitError::Timeout("30s".into()).into();
        assert!(matches!(err, FoundationError::TransientNetworkFailure(_)));

        let err: FoundationError = GitError::RefNotFound("heads/dev".into()).into();
        assert!(matches!(err, FoundationError::NotFound(_)));
    }
}
