//! Commit composer
//!
//! 하나의 ChangeProposal을 원격 브랜치에 커밋한다:
//!
//! ```text
//! ResolveHead → CreateBlob → CreateTree → CreateCommit → UpdateRef → Done
//!      │             │            │             │             │
//!      └─────────────┴────────────┴─────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Each step consumes the previous step's output. Nothing is retried; a
//! failed run must start over from `ResolveHead`. Objects created before a
//! failure are left unreferenced.

use super::backend::{GitBackend, RefUpdate, TreeEntry};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vibe_foundation::{ChangeProposal, Error, Result, DEFAULT_COMMIT_PREFIX};

// ============================================================================
// State Machine
// ============================================================================

/// Composer step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStage {
    ResolveHead,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
    Done,
    Failed,
}

impl fmt::Display for ComposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ResolveHead => "resolve-head",
            Self::CreateBlob => "create-blob",
            Self::CreateTree => "create-tree",
            Self::CreateCommit => "create-commit",
            Self::UpdateRef => "update-ref",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// In-flight commit.
///
/// Shas are filled strictly in creation order; a later sha without every
/// earlier one is malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRequest {
    pub branch: String,
    pub base_sha: Option<String>,
    pub blob_sha: Option<String>,
    pub tree_sha: Option<String>,
    pub commit_sha: Option<String>,
}

impl CommitRequest {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    fn slots(&self) -> [&Option<String>; 4] {
        [
            &self.base_sha,
            &self.blob_sha,
            &self.tree_sha,
            &self.commit_sha,
        ]
    }

    /// Populated shas form a prefix of the creation order
    pub fn is_well_formed(&self) -> bool {
        let slots = self.slots();
        let filled = slots.iter().take_while(|s| s.is_some()).count();
        slots[filled..].iter().all(|s| s.is_none())
    }

    /// The step this request is waiting on
    pub fn next_stage(&self) -> ComposeStage {
        if !self.is_well_formed() {
            return ComposeStage::Failed;
        }
        match self.slots().iter().take_while(|s| s.is_some()).count() {
            0 => ComposeStage::ResolveHead,
            1 => ComposeStage::CreateBlob,
            2 => ComposeStage::CreateTree,
            3 => ComposeStage::CreateCommit,
            _ => ComposeStage::UpdateRef,
        }
    }
}

/// A commit that landed on its branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub branch: String,
    pub base_sha: String,
    pub blob_sha: String,
    pub tree_sha: String,
    pub commit_sha: String,
    pub message: String,
}

// ============================================================================
// Composer
// ============================================================================

/// Applies one validated proposal as a single commit
pub struct CommitComposer {
    backend: Arc<dyn GitBackend>,
    message_prefix: String,
}

impl CommitComposer {
    pub fn new(backend: Arc<dyn GitBackend>) -> Self {
        Self {
            backend,
            message_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
        }
    }

    /// Prefix marking machine-authored commits (default `"vibed: "`)
    pub fn with_message_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_prefix = prefix.into();
        self
    }

    pub fn commit_message(&self, proposal: &ChangeProposal) -> String {
        let summary = proposal.summary().trim();
        if summary.is_empty() {
            format!("{}update {}", self.message_prefix, proposal.target_path())
        } else {
            format!("{}{}", self.message_prefix, summary)
        }
    }

    /// Commit `proposal` on top of the current head of `branch`.
    ///
    /// Returns [`Error::RefConflict`] when the branch moved after its head
    /// was resolved; the branch is left untouched in that case.
    pub async fn apply(&self, branch: &str, proposal: &ChangeProposal) -> Result<CommitOutcome> {
        let mut request = CommitRequest::new(branch);

        // 1. ResolveHead
        let base_sha = self
            .backend
            .get_ref(branch)
            .await
            .map_err(|e| fail(&request, e.into()))?;
        let base_tree = self
            .backend
            .commit_tree(&base_sha)
            .await
            .map_err(|e| fail(&request, e.into()))?;
        debug!("[{}] {} at {}", ComposeStage::ResolveHead, branch, base_sha);
        request.base_sha = Some(base_sha.clone());

        // 2. CreateBlob
        let blob_sha = self
            .backend
            .create_blob(proposal.content())
            .await
            .map_err(|e| fail(&request, e.into()))?;
        debug!("[{}] {}", ComposeStage::CreateBlob, blob_sha);
        request.blob_sha = Some(blob_sha.clone());

        // 3. CreateTree
        let entries = [TreeEntry::blob(proposal.target_path(), blob_sha.as_str())];
        let tree_sha = self
            .backend
            .create_tree(&base_tree, &entries)
            .await
            .map_err(|e| fail(&request, e.into()))?;
        debug!("[{}] {}", ComposeStage::CreateTree, tree_sha);
        request.tree_sha = Some(tree_sha.clone());

        // 4. CreateCommit - parent is the head captured in step 1
        let message = self.commit_message(proposal);
        let commit_sha = self
            .backend
            .create_commit(&tree_sha, &base_sha, &message)
            .await
            .map_err(|e| fail(&request, e.into()))?;
        debug!("[{}] {}", ComposeStage::CreateCommit, commit_sha);
        request.commit_sha = Some(commit_sha.clone());

        // 5. UpdateRef
        let update = self
            .backend
            .update_ref(branch, &base_sha, &commit_sha)
            .await
            .map_err(|e| fail(&request, e.into()))?;

        match update {
            RefUpdate::Updated => {
                info!(
                    "Committed {} to {} ({} -> {})",
                    proposal.target_path(),
                    branch,
                    base_sha,
                    commit_sha
                );
                Ok(CommitOutcome {
                    branch: branch.to_string(),
                    base_sha,
                    blob_sha,
                    tree_sha,
                    commit_sha,
                    message,
                })
            }
            RefUpdate::Conflict { found } => Err(fail(
                &request,
                Error::ref_conflict(branch, base_sha, found),
            )),
        }
    }
}

/// Log where the run stopped and pass the error through
fn fail(request: &CommitRequest, err: Error) -> Error {
    let stage = request.next_stage();
    if request.blob_sha.is_some() {
        warn!(
            "Commit on {} abandoned at {}, created objects left unreferenced: {}",
            request.branch, stage, err
        );
    } else {
        warn!("Commit on {} failed at {}: {}", request.branch, stage, err);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::backend::GitError;
    use crate::git::memory::{BackendOp, InMemoryBackend, OpKind};

    fn proposal(path: &str, summary: &str, content: &str) -> ChangeProposal {
        ChangeProposal::new(path, summary, content).expect("valid proposal")
    }

    #[test]
    fn test_request_well_formed_prefix() {
        let mut request = CommitRequest::new("main");
        assert!(request.is_well_formed());
        assert_eq!(request.next_stage(), ComposeStage::ResolveHead);

        request.base_sha = Some("abc123".into());
        request.blob_sha = Some("b".into());
        assert!(request.is_well_formed());
        assert_eq!(request.next_stage(), ComposeStage::CreateTree);

        request.commit_sha = Some("c".into());
        assert!(!request.is_well_formed());
        assert_eq!(request.next_stage(), ComposeStage::Failed);

        request.tree_sha = Some("t".into());
        assert_eq!(request.next_stage(), ComposeStage::UpdateRef);
    }

    #[test]
    fn test_commit_message() {
        let backend = Arc::new(InMemoryBackend::new());
        let composer = CommitComposer::new(backend);
        assert_eq!(
            composer.commit_message(&proposal("a.txt", " Rename header ", "")),
            "vibed: Rename header"
        );
        assert_eq!(
            composer.commit_message(&proposal("a.txt", "", "")),
            "vibed: update a.txt"
        );

        let composer = composer.with_message_prefix("bot: ");
        assert_eq!(composer.commit_message(&proposal("a.txt", "x", "")), "bot: x");
    }

    #[tokio::test]
    async fn test_apply_call_sequence() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed_file("main", "style.css", "body{}");
        let base = backend.seed_file("main", "index.html", "<html></html>");
        backend.clear_operations();

        let composer = CommitComposer::new(backend.clone());
        let outcome = composer
            .apply("main", &proposal("index.html", "x", "<html>...</html>"))
            .await
            .unwrap();

        assert_eq!(
            backend.operation_kinds(),
            vec![
                OpKind::GetRef,
                OpKind::CommitTree,
                OpKind::CreateBlob,
                OpKind::CreateTree,
                OpKind::CreateCommit,
                OpKind::UpdateRef,
            ]
        );

        let ops = backend.operations();
        assert!(matches!(&ops[2], BackendOp::CreateBlob { content, .. } if content == "<html>...</html>"));
        match &ops[4] {
            BackendOp::CreateCommit {
                parent, message, ..
            } => {
                assert_eq!(parent, &base);
                assert!(message.contains('x'));
            }
            other => panic!("unexpected op {:?}", other),
        }

        assert_eq!(outcome.base_sha, base);
        assert_eq!(backend.ref_value("main"), Some(outcome.commit_sha.clone()));
        assert_eq!(
            backend.read_file("main", "index.html").as_deref(),
            Some("<html>...</html>")
        );
        // Base tree entries survive the overlay
        assert_eq!(backend.read_file("main", "style.css").as_deref(), Some("body{}"));
    }

    #[tokio::test]
    async fn test_conflict_leaves_ref_unchanged() {
        let backend = Arc::new(InMemoryBackend::new());
        let base = backend.seed_file("main", "index.html", "v1");
        let other = backend.seed_file("main", "index.html", "v2");
        backend.force_ref("main", &base);
        backend.schedule_ref_move("main", &other);
        backend.clear_operations();

        let composer = CommitComposer::new(backend.clone());
        let err = composer
            .apply("main", &proposal("index.html", "x", "v3"))
            .await
            .unwrap_err();

        match &err {
            Error::RefConflict {
                branch,
                expected,
                found,
            } => {
                assert_eq!(branch, "main");
                assert_eq!(expected, &base);
                assert_eq!(found.as_deref(), Some(other.as_str()));
            }
            other => panic!("expected RefConflict, got {:?}", other),
        }
        assert!(err.leaves_orphans());

        // No further calls after the rejected update, ref is the other writer's
        assert_eq!(backend.operation_kinds().last(), Some(&OpKind::UpdateRef));
        assert_eq!(backend.ref_value("main"), Some(other));
    }

    #[tokio::test]
    async fn test_step_failure_stops_sequence() {
        let backend = Arc::new(InMemoryBackend::new());
        let base = backend.seed_file("main", "index.html", "v1");
        backend.fail_next(OpKind::CreateCommit, GitError::Timeout("30s".into()));
        backend.clear_operations();

        let composer = CommitComposer::new(backend.clone());
        let err = composer
            .apply("main", &proposal("index.html", "x", "v2"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransientNetworkFailure(_)));
        assert!(!backend.operation_kinds().contains(&OpKind::UpdateRef));
        assert_eq!(backend.ref_value("main"), Some(base));
    }

    #[tokio::test]
    async fn test_missing_branch() {
        let backend = Arc::new(InMemoryBackend::new());
        let composer = CommitComposer::new(backend.clone());
        let err = composer
            .apply("main", &proposal("index.html", "x", "v1"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(backend.operation_kinds(), vec![OpKind::GetRef]);
    }
}
