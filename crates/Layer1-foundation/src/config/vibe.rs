//! Vibe Config - 통합 설정
//!
//! 글로벌 (`<config_dir>/vibeship/config.json`) → 프로젝트 (`.vibeship/config.json`)
//! → 환경변수 순서로 병합합니다. 나중 값이 우선합니다.

use crate::core::SecretString;
use crate::storage::ConfigStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 설정 파일명
pub const VIBE_CONFIG_FILE: &str = "config.json";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_COMMIT_PREFIX: &str = "vibed: ";
pub const DEFAULT_MAX_CREDENTIAL_ATTEMPTS: u32 = 5;

/// Directories that never make sense to show the model.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/**",
    "target/**",
    "dist/**",
    "build/**",
    ".git/**",
    "vendor/**",
];

// ============================================================================
// Vibe Config (통합)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VibeConfig {
    #[serde(default)]
    pub github: GitHubSettings,

    #[serde(default)]
    pub model: ModelSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// SQLite 데이터 디렉토리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl VibeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 + 환경변수 병합 로드
    pub fn load() -> Result<Self> {
        let mut scopes = Vec::new();
        if let Ok(global) = ConfigStore::global() {
            scopes.push(global);
        }
        if let Ok(project) = ConfigStore::current_project() {
            scopes.push(project);
        }
        Self::load_with(&scopes, |key| std::env::var(key).ok())
    }

    /// Merge `scopes` in order (later wins), then apply env overrides.
    pub fn load_with<F>(scopes: &[ConfigStore], lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        for scope in scopes {
            if let Some(found) = scope.load()? {
                config.merge(found);
            }
        }
        config.apply_env_overrides(lookup);
        Ok(config)
    }

    /// 환경변수 오버라이드
    ///
    /// `lookup` is injected so tests never mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.github.token = Some(SecretString::new(token));
        }
        if let Some(owner) = non_empty("VIBE_GITHUB_OWNER") {
            self.github.owner = Some(owner);
        }
        if let Some(repo) = non_empty("VIBE_GITHUB_REPO") {
            self.github.repo = Some(repo);
        }
        if let Some(branch) = non_empty("VIBE_BRANCH") {
            self.github.branch = Some(branch);
        }
        if let Some(model) = non_empty("GEMINI_MODEL") {
            self.model.name = Some(model);
        }
        if let Some(dir) = non_empty("VIBE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: VibeConfig) {
        self.github.merge(other.github);
        self.model.merge(other.model);
        self.pipeline.merge(other.pipeline);
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
    }

    /// Check that everything needed to reach the repository is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.github.token.as_ref().map_or(true, |t| t.is_blank()) {
            missing.push("github.token (or GITHUB_TOKEN)");
        }
        if self.github.owner.is_none() {
            missing.push("github.owner (or VIBE_GITHUB_OWNER)");
        }
        if self.github.repo.is_none() {
            missing.push("github.repo (or VIBE_GITHUB_REPO)");
        }
        if self.pipeline.effective_max_attempts() == 0 {
            missing.push("pipeline.maxCredentialAttempts must be at least 1");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing settings: {}", missing.join(", "))))
        }
    }

    /// 데이터 디렉토리 (기본: ~/.vibeship)
    pub fn effective_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".vibeship")
        })
    }
}

// ============================================================================
// GitHub Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSettings {
    /// Personal access token (never written back to disk)
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl GitHubSettings {
    pub fn effective_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_GITHUB_API_URL)
    }

    pub fn effective_branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    pub fn effective_timeout(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }

    fn merge(&mut self, other: GitHubSettings) {
        if other.token.is_some() {
            self.token = other.token;
        }
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        if other.owner.is_some() {
            self.owner = other.owner;
        }
        if other.repo.is_some() {
            self.repo = other.repo;
        }
        if other.branch.is_some() {
            self.branch = other.branch;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
    }
}

// ============================================================================
// Model Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_MODEL_BASE_URL)
    }

    pub fn effective_timeout(&self) -> u64 {
        self.timeout_secs.unwrap_or(60)
    }

    pub fn effective_max_output_tokens(&self) -> u32 {
        self.max_output_tokens.unwrap_or(8192)
    }

    fn merge(&mut self, other: ModelSettings) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.max_output_tokens.is_some() {
            self.max_output_tokens = other.max_output_tokens;
        }
    }
}

// ============================================================================
// Pipeline Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_credential_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_prefix: Option<String>,

    /// Replaces the default ignore list when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
}

impl PipelineSettings {
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_credential_attempts
            .unwrap_or(DEFAULT_MAX_CREDENTIAL_ATTEMPTS)
    }

    pub fn effective_commit_prefix(&self) -> &str {
        self.commit_prefix.as_deref().unwrap_or(DEFAULT_COMMIT_PREFIX)
    }

    pub fn effective_ignore(&self) -> Vec<String> {
        match &self.ignore {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn merge(&mut self, other: PipelineSettings) {
        if other.max_credential_attempts.is_some() {
            self.max_credential_attempts = other.max_credential_attempts;
        }
        if other.commit_prefix.is_some() {
            self.commit_prefix = other.commit_prefix;
        }
        if other.ignore.is_some() {
            self.ignore = other.ignore;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = VibeConfig::default();
        assert_eq!(config.github.effective_api_url(), DEFAULT_GITHUB_API_URL);
        assert_eq!(config.github.effective_branch(), "main");
        assert_eq!(config.model.effective_name(), "gemini-1.5-flash");
        assert_eq!(config.pipeline.effective_max_attempts(), 5);
        assert_eq!(config.pipeline.effective_commit_prefix(), "vibed: ");
        assert!(config
            .pipeline
            .effective_ignore()
            .contains(&"node_modules/**".to_string()));
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base: VibeConfig = serde_json::from_str(
            r#"{"github": {"owner": "a", "repo": "r1", "branch": "dev"}}"#,
        )
        .unwrap();
        let project: VibeConfig =
            serde_json::from_str(r#"{"github": {"repo": "r2"}, "pipeline": {"commitPrefix": "bot: "}}"#)
                .unwrap();

        base.merge(project);
        assert_eq!(base.github.owner.as_deref(), Some("a"));
        assert_eq!(base.github.repo.as_deref(), Some("r2"));
        assert_eq!(base.github.effective_branch(), "dev");
        assert_eq!(base.pipeline.effective_commit_prefix(), "bot: ");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "ghp_token"),
            ("VIBE_GITHUB_OWNER", "octo"),
            ("VIBE_GITHUB_REPO", "site"),
            ("VIBE_BRANCH", ""),
        ]
        .into_iter()
        .collect();

        let mut config = VibeConfig::default();
        config.github.branch = Some("dev".to_string());
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.github.token.as_ref().unwrap().expose(), "ghp_token");
        assert_eq!(config.github.owner.as_deref(), Some("octo"));
        // blank values do not override
        assert_eq!(config.github.effective_branch(), "dev");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing() {
        let err = VibeConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("github.token"));
        assert!(msg.contains("github.repo"));
    }

    #[test]
    fn test_token_never_serialized() {
        let mut config = VibeConfig::default();
        config.github.token = Some(SecretString::new("ghp_secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("ghp_secret"));
    }

    #[test]
    fn test_load_with_scopes() {
        let global_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let global = ConfigStore::at(global_dir.path());
        let project = ConfigStore::project(project_dir.path());

        global
            .update(|c| {
                c.github.owner = Some("octo".to_string());
                c.github.repo = Some("site".to_string());
            })
            .unwrap();
        project
            .update(|c| c.github.repo = Some("docs".to_string()))
            .unwrap();

        let config = VibeConfig::load_with(&[global, project], |key| {
            (key == "VIBE_BRANCH").then(|| "preview".to_string())
        })
        .unwrap();
        assert_eq!(config.github.owner.as_deref(), Some("octo"));
        assert_eq!(config.github.repo.as_deref(), Some("docs"));
        assert_eq!(config.github.effective_branch(), "preview");
    }
}
