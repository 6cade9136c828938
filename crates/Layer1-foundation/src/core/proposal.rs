//! ChangeProposal - 모델이 제안한 단일 파일 변경
//!
//! A `ChangeProposal` can only be built through [`ChangeProposal::new`],
//! which validates the target path. Holding one means validation passed.

use serde::Serialize;
use thiserror::Error;

/// Why a model response was rejected as a proposal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("model response is empty")]
    Empty,

    #[error("model response is not valid JSON: {0}")]
    NotJson(String),

    #[error("model response is not a JSON object")]
    NotAnObject,

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("key `{key}` must be a {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("target path is empty")]
    EmptyPath,

    #[error("target path is not a safe relative path: {0}")]
    UnsafePath(String),
}

/// A validated, immutable single-file change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeProposal {
    target_path: String,
    summary: String,
    content: String,
}

impl ChangeProposal {
    /// Validate and build a proposal.
    pub fn new(
        target_path: impl Into<String>,
        summary: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ProposalError> {
        let target_path = target_path.into().trim().to_string();
        validate_path(&target_path)?;

        Ok(Self {
            target_path,
            summary: summary.into(),
            content: content.into(),
        })
    }

    /// 대상 파일 경로 (저장소 루트 기준)
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// 사람이 읽을 수 있는 변경 요약
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// 전체 교체 파일 내용
    pub fn content(&self) -> &str {
        &self.content
    }
}

fn validate_path(path: &str) -> Result<(), ProposalError> {
    if path.is_empty() {
        return Err(ProposalError::EmptyPath);
    }

    let unsafe_path = path.starts_with('/')
        || path.contains('\\')
        || path.contains('\0')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if unsafe_path {
        return Err(ProposalError::UnsafePath(path.to_string()));
    }

    Ok(())
}
