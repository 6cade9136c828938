//! vibe-core: repository access for vibeship
//!
//! Layer2 - 원격 저장소 읽기/쓰기 레이어
//!
//! # 주요 모듈
//!
//! - `git`: Git object API 백엔드, 스냅샷 리더, 커밋 컴포저
//!
//! # 사용 예시
//!
//! ```ignore
//! use vibe_core::{CommitComposer, GitHubBackend, IgnoreRules, RepositorySnapshotReader};
//!
//! let backend = Arc::new(GitHubBackend::from_settings(&config.github)?);
//!
//! let reader = RepositorySnapshotReader::new(backend.clone(), IgnoreRules::defaults());
//! let snapshot = reader.fetch_file_list("main").await?;
//!
//! let composer = CommitComposer::new(backend);
//! let outcome = composer.apply("main", &proposal).await?;
//! ```

pub mod git;

// Re-exports: Git
pub use git::{
    BackendOp, CommitComposer, CommitOutcome, CommitRequest, ComposeStage, EntryKind,
    GitBackend, GitError, GitHubBackend, IgnoreRules, InMemoryBackend, OpKind, RefUpdate,
    RepositorySnapshot, RepositorySnapshotReader, TreeEntry,
};
