//! `vibe init` - write the project config
//!
//! Records owner / repo / branch in `.vibeship/config.json`. The token is
//! never written; it stays in `GITHUB_TOKEN` or `--token`.

use vibe_foundation::ConfigStore;

/// Repository coordinates to record
#[derive(Debug, Default)]
pub struct InitOptions {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub force: bool,
}

/// Returns `false` when the project was already initialized and left alone.
pub fn init_project(store: &ConfigStore, options: InitOptions) -> anyhow::Result<bool> {
    if store.exists() && !options.force {
        println!("✓ vibeship already initialized ({}).", store.path().display());
        println!("  Use --force to overwrite owner / repo / branch.");
        return Ok(false);
    }

    let saved = store.update(|config| {
        if options.owner.is_some() {
            config.github.owner = options.owner;
        }
        if options.repo.is_some() {
            config.github.repo = options.repo;
        }
        if options.branch.is_some() {
            config.github.branch = options.branch;
        }
    })?;

    println!("Initialized {}", store.path().display());
    println!(
        "  repository: {}/{} ({})",
        saved.github.owner.as_deref().unwrap_or("<owner?>"),
        saved.github.repo.as_deref().unwrap_or("<repo?>"),
        saved.github.effective_branch()
    );
    println!("  Set GITHUB_TOKEN and donate a Gemini key with `vibe keys donate <KEY>`.");

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(repo: &str, force: bool) -> InitOptions {
        InitOptions {
            owner: Some("octo".to_string()),
            repo: Some(repo.to_string()),
            branch: None,
            force,
        }
    }

    #[test]
    fn test_init_writes_project_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::project(dir.path());

        assert!(init_project(&store, options("site", false)).unwrap());
        let config = store.load().unwrap().unwrap();
        assert_eq!(config.github.owner.as_deref(), Some("octo"));
        assert_eq!(config.github.repo.as_deref(), Some("site"));
    }

    #[test]
    fn test_init_respects_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::project(dir.path());
        init_project(&store, options("site", false)).unwrap();

        assert!(!init_project(&store, options("docs", false)).unwrap());
        assert_eq!(
            store.load().unwrap().unwrap().github.repo.as_deref(),
            Some("site")
        );

        assert!(init_project(&store, options("docs", true)).unwrap());
        assert_eq!(
            store.load().unwrap().unwrap().github.repo.as_deref(),
            Some("docs")
        );
    }
}
