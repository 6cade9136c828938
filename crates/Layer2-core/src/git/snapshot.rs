//! Repository snapshot reader
//!
//! 브랜치의 파일 목록을 읽는다 (ignore 패턴 제외). 순수 읽기, 재시도 없음.

use super::backend::GitBackend;
use glob::{MatchOptions, Pattern};
use std::sync::Arc;
use tracing::debug;
use vibe_foundation::{Error, Result, DEFAULT_IGNORE_PATTERNS};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

// ============================================================================
// Ignore Rules
// ============================================================================

/// Compiled ignore patterns.
///
/// A pattern matches a path from the root or from any segment boundary,
/// so `node_modules/**` also ignores `web/node_modules/x.js`. A trailing
/// `/**` also matches the directory itself.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }

            compiled.push(compile(raw)?);
            if let Some(dir) = raw.strip_suffix("/**") {
                if !dir.is_empty() {
                    compiled.push(compile(dir)?);
                }
            }
        }
        Ok(Self { patterns: compiled })
    }

    /// Built-in dependency/build directory patterns
    pub fn defaults() -> Self {
        // The built-in patterns are valid glob syntax
        Self::new(DEFAULT_IGNORE_PATTERNS).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        suffixes(path).any(|candidate| {
            self.patterns
                .iter()
                .any(|p| p.matches_with(candidate, MATCH_OPTIONS))
        })
    }
}

fn compile(raw: &str) -> Result<Pattern> {
    Pattern::new(raw)
        .map_err(|e| Error::Config(format!("Invalid ignore pattern '{}': {}", raw, e)))
}

/// `a/b/c` → `a/b/c`, `b/c`, `c`
fn suffixes(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(
        path.match_indices('/')
            .map(move |(idx, _)| &path[idx + 1..])
            .filter(|s| !s.is_empty()),
    )
}

// ============================================================================
// Snapshot
// ============================================================================

/// File paths at a reference, in backend order. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    reference: String,
    paths: Vec<String>,
}

impl RepositorySnapshot {
    pub fn new(reference: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            reference: reference.into(),
            paths,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

/// Lists files at a reference through a [`GitBackend`]
pub struct RepositorySnapshotReader {
    backend: Arc<dyn GitBackend>,
    ignore: IgnoreRules,
}

impl RepositorySnapshotReader {
    pub fn new(backend: Arc<dyn GitBackend>, ignore: IgnoreRules) -> Self {
        Self { backend, ignore }
    }

    /// Recursive file list at `reference`, minus ignored paths.
    ///
    /// Failures propagate as-is; nothing is cached between calls.
    pub async fn fetch_file_list(&self, reference: &str) -> Result<RepositorySnapshot> {
        let entries = self.backend.list_tree(reference).await?;
        let total = entries.len();

        let paths: Vec<String> = entries
            .into_iter()
            .filter(|e| e.is_blob() && !self.ignore.is_ignored(&e.path))
            .map(|e| e.path)
            .collect();

        debug!(
            "Snapshot of {}: {} files ({} tree entries)",
            reference,
            paths.len(),
            total
        );

        Ok(RepositorySnapshot::new(reference, paths))
    }
}
