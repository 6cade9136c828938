//! In-memory object store
//!
//! Git-style content addressing (SHA-256 over `"<kind> <len>\0<payload>"`)
//! with true compare-and-swap ref updates and a journal of every call.
//! Used by tests and dry runs.

use super::backend::{EntryKind, GitBackend, GitError, RefUpdate, TreeEntry, FILE_MODE};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A call made against the backend, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    GetRef {
        branch: String,
    },
    CommitTree {
        commit: String,
    },
    ListTree {
        reference: String,
    },
    CreateBlob {
        content: String,
        sha: String,
    },
    CreateTree {
        base_tree: String,
        entries: Vec<TreeEntry>,
        sha: String,
    },
    CreateCommit {
        tree: String,
        parent: String,
        message: String,
        sha: String,
    },
    UpdateRef {
        branch: String,
        expected: String,
        new: String,
        applied: bool,
    },
}

impl BackendOp {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::GetRef { .. } => OpKind::GetRef,
            Self::CommitTree { .. } => OpKind::CommitTree,
            Self::ListTree { .. } => OpKind::ListTree,
            Self::CreateBlob { .. } => OpKind::CreateBlob,
            Self::CreateTree { .. } => OpKind::CreateTree,
            Self::CreateCommit { .. } => OpKind::CreateCommit,
            Self::UpdateRef { .. } => OpKind::UpdateRef,
        }
    }
}

/// Backend call kind, for failure injection and order assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    GetRef,
    CommitTree,
    ListTree,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

#[derive(Debug, Clone)]
enum Object {
    Blob(String),
    /// Flat path → blob sha
    Tree(BTreeMap<String, String>),
    Commit { tree: String },
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Object>,
    refs: HashMap<String, String>,
    journal: Vec<BackendOp>,
    failures: HashMap<OpKind, GitError>,
    /// Writer that moves a branch just before the next ref update
    pending_move: Option<(String, String)>,
}

impl Inner {
    fn take_failure(&mut self, kind: OpKind) -> Result<(), GitError> {
        match self.failures.remove(&kind) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn store(&mut self, kind: &str, payload: &str, object: Object) -> String {
        let sha = object_id(kind, payload);
        self.objects.entry(sha.clone()).or_insert(object);
        sha
    }

    fn tree_of_commit(&self, commit_sha: &str) -> Result<String, GitError> {
        match self.objects.get(commit_sha) {
            Some(Object::Commit { tree }) => Ok(tree.clone()),
            _ => Err(GitError::ObjectNotFound(commit_sha.to_string())),
        }
    }

    fn tree_files(&self, tree_sha: &str) -> Result<BTreeMap<String, String>, GitError> {
        match self.objects.get(tree_sha) {
            Some(Object::Tree(files)) => Ok(files.clone()),
            _ => Err(GitError::ObjectNotFound(tree_sha.to_string())),
        }
    }

    /// Branch name, commit sha, or tree sha → tree sha
    fn resolve_tree(&self, reference: &str) -> Result<String, GitError> {
        if let Some(commit) = self.refs.get(reference) {
            return self.tree_of_commit(commit);
        }
        match self.objects.get(reference) {
            Some(Object::Commit { tree }) => Ok(tree.clone()),
            Some(Object::Tree(_)) => Ok(reference.to_string()),
            _ => Err(GitError::RefNotFound(reference.to_string())),
        }
    }

    fn put_tree(&mut self, files: BTreeMap<String, String>) -> String {
        let payload: String = files
            .iter()
            .map(|(path, sha)| format!("{} blob {}\t{}\n", FILE_MODE, sha, path))
            .collect();
        self.store("tree", &payload, Object::Tree(files))
    }

    fn put_commit(&mut self, tree: &str, parent: Option<&str>, message: &str) -> String {
        let mut payload = format!("tree {}\n", tree);
        if let Some(parent) = parent {
            payload.push_str(&format!("parent {}\n", parent));
        }
        payload.push('\n');
        payload.push_str(message);
        self.store(
            "commit",
            &payload,
            Object::Commit {
                tree: tree.to_string(),
            },
        )
    }
}

/// Git-style object id
pub fn object_id(kind: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}\0", kind, payload.len()).as_bytes());
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory [`GitBackend`]
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `content` at `path` on top of `branch`, creating the branch
    /// when it does not exist yet. Not journaled.
    pub fn seed_file(&self, branch: &str, path: &str, content: &str) -> String {
        let mut inner = self.inner.lock();

        let parent = inner.refs.get(branch).cloned();
        let mut files = match &parent {
            Some(commit) => inner
                .tree_of_commit(commit)
                .and_then(|tree| inner.tree_files(&tree))
                .unwrap_or_default(),
            None => BTreeMap::new(),
        };

        let blob = inner.store("blob", content, Object::Blob(content.to_string()));
        files.insert(path.to_string(), blob);
        let tree = inner.put_tree(files);
        let commit = inner.put_commit(&tree, parent.as_deref(), &format!("seed {}", path));
        inner.refs.insert(branch.to_string(), commit.clone());
        commit
    }

    /// Point `branch` at `sha` unconditionally. Not journaled.
    pub fn force_ref(&self, branch: &str, sha: &str) {
        self.inner
            .lock()
            .refs
            .insert(branch.to_string(), sha.to_string());
    }

    /// Simulate another writer moving `branch` to `sha` right before the
    /// next `update_ref` call.
    pub fn schedule_ref_move(&self, branch: &str, sha: &str) {
        self.inner.lock().pending_move = Some((branch.to_string(), sha.to_string()));
    }

    /// Make the next call of `kind` fail with `error`
    pub fn fail_next(&self, kind: OpKind, error: GitError) {
        self.inner.lock().failures.insert(kind, error);
    }

    pub fn ref_value(&self, branch: &str) -> Option<String> {
        self.inner.lock().refs.get(branch).cloned()
    }

    /// File content at `reference` (branch or commit)
    pub fn read_file(&self, reference: &str, path: &str) -> Option<String> {
        let inner = self.inner.lock();
        let tree = inner.resolve_tree(reference).ok()?;
        let files = inner.tree_files(&tree).ok()?;
        match inner.objects.get(files.get(path)?) {
            Some(Object::Blob(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Journal of every backend call so far
    pub fn operations(&self) -> Vec<BackendOp> {
        self.inner.lock().journal.clone()
    }

    pub fn operation_kinds(&self) -> Vec<OpKind> {
        self.inner.lock().journal.iter().map(BackendOp::kind).collect()
    }

    pub fn clear_operations(&self) {
        self.inner.lock().journal.clear();
    }
}

#[async_trait]
impl GitBackend for InMemoryBackend {
    async fn get_ref(&self, branch: &str) -> Result<String, GitError> {
        let mut inner = self.inner.lock();
        inner.journal.push(BackendOp::GetRef {
            branch: branch.to_string(),
        });
        inner.take_failure(OpKind::GetRef)?;

        inner
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound(branch.to_string()))
    }

    async fn commit_tree(&self, commit_sha: &str) -> Result<String, GitError> {
        let mut inner = self.inner.lock();
        inner.journal.push(BackendOp::CommitTree {
            commit: commit_sha.to_string(),
        });
        inner.take_failure(OpKind::CommitTree)?;

        inner.tree_of_commit(commit_sha)
    }

    async fn list_tree(&self, reference: &str) -> Result<Vec<TreeEntry>, GitError> {
        let mut inner = self.inner.lock();
        inner.journal.push(BackendOp::ListTree {
            reference: reference.to_string(),
        });
        inner.take_failure(OpKind::ListTree)?;

        let tree = inner.resolve_tree(reference)?;
        let files = inner.tree_files(&tree)?;

        // Recursive listing includes the intermediate directories
        let mut dirs = BTreeSet::new();
        for path in files.keys() {
            let mut prefix = path.as_str();
            while let Some(idx) = prefix.rfind('/') {
                prefix = &prefix[..idx];
                dirs.insert(prefix.to_string());
            }
        }

        let mut entries: Vec<TreeEntry> = dirs
            .into_iter()
            .map(|dir| TreeEntry {
                sha: object_id("tree", &dir),
                path: dir,
                mode: "040000".to_string(),
                kind: EntryKind::Tree,
            })
            .chain(
                files
                    .into_iter()
                    .map(|(path, sha)| TreeEntry::blob(path, sha)),
            )
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(entries)
    }

    async fn create_blob(&self, content: &str) -> Result<String, GitError> {
        let mut inner = self.inner.lock();
        inner.take_failure(OpKind::CreateBlob)?;

        let sha = inner.store("blob", content, Object::Blob(content.to_string()));
        inner.journal.push(BackendOp::CreateBlob {
            content: content.to_string(),
            sha: sha.clone(),
        });
        Ok(sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GitError> {
        let mut inner = self.inner.lock();
        inner.take_failure(OpKind::CreateTree)?;

        let mut files = inner.tree_files(base_tree)?;
        for entry in entries {
            if !inner.objects.contains_key(&entry.sha) {
                return Err(GitError::ObjectNotFound(entry.sha.clone()));
            }
            files.insert(entry.path.clone(), entry.sha.clone());
        }

        let sha = inner.put_tree(files);
        inner.journal.push(BackendOp::CreateTree {
            base_tree: base_tree.to_string(),
            entries: entries.to_vec(),
            sha: sha.clone(),
        });
        Ok(sha)
    }

    async fn create_commit(
        &self,
        tree_sha: &str,
        parent_sha: &str,
        message: &str,
    ) -> Result<String, GitError> {
        let mut inner = self.inner.lock();
        inner.take_failure(OpKind::CreateCommit)?;

        inner.tree_files(tree_sha)?;
        inner.tree_of_commit(parent_sha)?;

        let sha = inner.put_commit(tree_sha, Some(parent_sha), message);
        inner.journal.push(BackendOp::CreateCommit {
            tree: tree_sha.to_string(),
            parent: parent_sha.to_string(),
            message: message.to_string(),
            sha: sha.clone(),
        });
        Ok(sha)
    }

    async fn update_ref(
        &self,
        branch: &str,
        expected_old: &str,
        new_sha: &str,
    ) -> Result<RefUpdate, GitError> {
        let mut inner = self.inner.lock();

        if let Some((moved_branch, sha)) = inner.pending_move.take() {
            inner.refs.insert(moved_branch, sha);
        }

        if let Err(err) = inner.take_failure(OpKind::UpdateRef) {
            inner.journal.push(BackendOp::UpdateRef {
                branch: branch.to_string(),
                expected: expected_old.to_string(),
                new: new_sha.to_string(),
                applied: false,
            });
            return Err(err);
        }

        let current = inner.refs.get(branch).cloned();
        let applied = current.as_deref() == Some(expected_old);
        if applied {
            inner.refs.insert(branch.to_string(), new_sha.to_string());
        }

        inner.journal.push(BackendOp::UpdateRef {
            branch: branch.to_string(),
            expected: expected_old.to_string(),
            new: new_sha.to_string(),
            applied,
        });

        if applied {
            Ok(RefUpdate::Updated)
        } else {
            Ok(RefUpdate::Conflict { found: current })
        }
    }
}
