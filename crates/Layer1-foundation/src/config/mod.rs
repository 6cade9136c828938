//! Config - 통합 설정 관리
//!
//! - `vibe.rs` - VibeConfig 통합 설정 (github / model / pipeline)

mod vibe;

pub use vibe::{
    GitHubSettings, ModelSettings, PipelineSettings, VibeConfig, DEFAULT_BRANCH,
    DEFAULT_COMMIT_PREFIX, DEFAULT_GITHUB_API_URL, DEFAULT_IGNORE_PATTERNS,
    DEFAULT_MAX_CREDENTIAL_ATTEMPTS, DEFAULT_MODEL, DEFAULT_MODEL_BASE_URL, VIBE_CONFIG_FILE,
};
