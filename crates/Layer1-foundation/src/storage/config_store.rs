//! Config file store
//!
//! One `config.json` per scope: global (`<config_dir>/vibeship/`) or project
//! (`<root>/.vibeship/`). The GitHub token is never written: it only comes
//! from the environment or a CLI flag.

use crate::config::{VibeConfig, VIBE_CONFIG_FILE};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// 설정 디렉토리 이름
const VIBE_DIR: &str = "vibeship";
const PROJECT_DIR: &str = ".vibeship";

/// `VibeConfig` file in one scope
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 글로벌 설정
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(VIBE_DIR);
        Ok(Self::at(dir))
    }

    /// 프로젝트 설정
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::at(root.as_ref().join(PROJECT_DIR))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(VIBE_CONFIG_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// `None` when the scope has no config file. A blank file counts as empty.
    pub fn load(&self) -> Result<Option<VibeConfig>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Some(VibeConfig::default()));
        }

        let config: VibeConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        if config.github.token.is_some() {
            tracing::warn!(
                "{} contains a GitHub token; it is ignored on the next save. Use GITHUB_TOKEN instead.",
                path.display()
            );
        }
        Ok(Some(config))
    }

    /// Write `config` without its token, replacing the file atomically.
    pub fn save(&self, config: &VibeConfig) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Config(format!("Failed to create directory: {}", e)))?;

        let mut on_disk = config.clone();
        on_disk.github.token = None;
        let content = serde_json::to_string_pretty(&on_disk)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::Config(format!("Failed to replace {}: {}", path.display(), e)))
    }

    /// Load (or start empty), apply `change`, save. Returns the saved config.
    pub fn update<F>(&self, change: F) -> Result<VibeConfig>
    where
        F: FnOnce(&mut VibeConfig),
    {
        let mut config = self.load()?.unwrap_or_default();
        change(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretString;

    #[test]
    fn test_missing_and_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::project(dir.path());
        assert!(store.path().ends_with(".vibeship/config.json"));
        assert!(store.load().unwrap().is_none());

        std::fs::create_dir_all(dir.path().join(".vibeship")).unwrap();
        std::fs::write(store.path(), "  \n").unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.github.repo.is_none());
    }

    #[test]
    fn test_save_never_writes_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        let mut config = VibeConfig::default();
        config.github.repo = Some("site".to_string());
        config.github.token = Some(SecretString::new("ghp_do_not_store"));
        store.save(&config).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("ghp_do_not_store"));
        assert!(!dir.path().join("config.json.tmp").exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.github.repo.as_deref(), Some("site"));
        assert!(loaded.github.token.is_none());
    }

    #[test]
    fn test_update_keeps_existing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());

        store
            .update(|c| c.pipeline.commit_prefix = Some("bot: ".to_string()))
            .unwrap();
        let saved = store
            .update(|c| c.github.owner = Some("octo".to_string()))
            .unwrap();

        assert_eq!(saved.github.owner.as_deref(), Some("octo"));
        assert_eq!(saved.pipeline.effective_commit_prefix(), "bot: ");
        assert_eq!(store.load().unwrap().unwrap().github.owner.as_deref(), Some("octo"));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(Error::Config(_))));
    }
}
