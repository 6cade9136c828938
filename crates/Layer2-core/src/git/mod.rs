//! Git Integration Module
//!
//! Remote repository access through the Git object API:
//! - Snapshot: 브랜치의 파일 목록 (ignore 패턴 적용)
//! - Composer: blob → tree → commit → ref 순서의 단일 커밋
//!
//! ## Backends
//!
//! - **GitHub**: Git Data API over HTTPS
//! - **InMemory**: content-addressed store with CAS refs, for tests and dry runs

pub mod backend;
pub mod composer;
pub mod github;
pub mod memory;
pub mod snapshot;

pub use backend::{EntryKind, GitBackend, GitError, RefUpdate, TreeEntry, FILE_MODE};
pub use composer::{CommitComposer, CommitOutcome, CommitRequest, ComposeStage};
pub use github::GitHubBackend;
pub use memory::{object_id, BackendOp, InMemoryBackend, OpKind};
pub use snapshot::{IgnoreRules, RepositorySnapshot, RepositorySnapshotReader};
