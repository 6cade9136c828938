//! # vibe-foundation
//!
//! Foundation layer for vibeship:
//! - Error: 파이프라인 전체의 에러 분류
//! - Core: 도메인 타입 (Credential, ChangeProposal, SessionContext)
//! - Config: 통합 설정 (VibeConfig)
//! - Storage: SQLite (credential pool, 채팅 기록), ConfigStore (config.json)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer4-cli        vibe run / keys / sessions           │
//! │  Layer3-agent      PipelineOrchestrator (propose/ship)  │
//! │  Layer2-core       Snapshot reader, CommitComposer      │
//! │  Layer2-provider   CredentialPool, Gemini client        │
//! │  Layer1-foundation Error, types, config, storage        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (도메인 타입)
// ============================================================================
pub use core::{
    // Proposal (proposal.rs)
    ChangeProposal,
    // Credential (types.rs)
    Credential,
    CredentialId,
    CredentialStatus,
    ProposalError,
    SecretString,
    // Session (types.rs)
    SessionContext,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    GitHubSettings, ModelSettings, PipelineSettings, VibeConfig, DEFAULT_BRANCH,
    DEFAULT_COMMIT_PREFIX, DEFAULT_GITHUB_API_URL, DEFAULT_IGNORE_PATTERNS,
    DEFAULT_MAX_CREDENTIAL_ATTEMPTS, DEFAULT_MODEL, DEFAULT_MODEL_BASE_URL, VIBE_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{
    // Traits (경계)
    ChatHistory,
    ChatRole,
    CredentialStore,
    // Config files (설정)
    ConfigStore,
    // SQLite (런타임 데이터)
    MessageRecord,
    SessionRecord,
    Storage,
};
