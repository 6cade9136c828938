//! GitHub Git Data API backend

use super::backend::{GitBackend, GitError, RefUpdate, TreeEntry};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use vibe_foundation::{Error, GitHubSettings, Result, SecretString, DEFAULT_GITHUB_API_URL};

const USER_AGENT: &str = concat!("vibeship/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// [`GitBackend`] over `https://api.github.com/repos/{owner}/{repo}/git/*`.
///
/// GitHub has no compare-and-swap on refs: `update_ref` re-reads the ref
/// right before a non-forced PATCH and treats divergence, or a rejected
/// fast-forward, as a conflict.
pub struct GitHubBackend {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    token: SecretString,
}

impl GitHubBackend {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: SecretString,
    ) -> std::result::Result<Self, GitError> {
        Ok(Self {
            client: Self::build_client(Duration::from_secs(30))?,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token,
        })
    }

    /// Create from the `github` section of the config
    pub fn from_settings(settings: &GitHubSettings) -> Result<Self> {
        let token = settings
            .token
            .clone()
            .filter(|t| !t.is_blank())
            .ok_or_else(|| Error::Config("github.token is not set".to_string()))?;
        let owner = settings
            .owner
            .clone()
            .ok_or_else(|| Error::Config("github.owner is not set".to_string()))?;
        let repo = settings
            .repo
            .clone()
            .ok_or_else(|| Error::Config("github.repo is not set".to_string()))?;

        Ok(Self::new(owner, repo, token)?
            .with_timeout(Duration::from_secs(settings.effective_timeout()))?
            .with_api_url(settings.effective_api_url()))
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> std::result::Result<Self, GitError> {
        self.client = Self::build_client(timeout)?;
        Ok(self)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_client(timeout: Duration) -> std::result::Result<Client, GitError> {
        Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitError::Network(format!("Failed to create HTTP client: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/{}",
            self.api_url, self.owner, self.repo, path
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.token.expose())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, GitError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| GitError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                GitError::Timeout(e.to_string())
            } else {
                GitError::InvalidResponse(e.to_string())
            }
        })
    }

    fn parse_error_response(status: StatusCode, body: &str) -> GitError {
        let message = serde_json::from_str::<GitHubErrorResponse>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string());

        GitError::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Pre-PATCH check: GitHub has no ref compare-and-swap, so a ref that
    /// no longer points at `expected_old` is reported before writing.
    fn diverged(expected_old: &str, current: String) -> Option<RefUpdate> {
        (current != expected_old).then(|| RefUpdate::Conflict {
            found: Some(current),
        })
    }

    fn is_fast_forward_rejection(err: &GitError) -> bool {
        matches!(
            err,
            GitError::Http { status: 409 | 422, message }
                if message.to_lowercase().contains("fast forward")
                    || message.to_lowercase().contains("fast-forward")
        )
    }
}

#[async_trait]
impl GitBackend for GitHubBackend {
    async fn get_ref(&self, branch: &str) -> std::result::Result<String, GitError> {
        let request = self.client.get(self.url(&format!("ref/heads/{}", branch)));
        match self.send::<RefResponse>(request).await {
            Ok(r) => Ok(r.object.sha),
            Err(GitError::Http { status: 404, .. }) => Err(GitError::RefNotFound(branch.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn commit_tree(&self, commit_sha: &str) -> std::result::Result<String, GitError> {
        let request = self.client.get(self.url(&format!("commits/{}", commit_sha)));
        let commit: CommitResponse = self.send(request).await?;
        Ok(commit.tree.sha)
    }

    async fn list_tree(&self, reference: &str) -> std::result::Result<Vec<TreeEntry>, GitError> {
        let request = self
            .client
            .get(self.url(&format!("trees/{}", reference)))
            .query(&[("recursive", "1")]);

        let tree: TreeResponse = match self.send(request).await {
            Ok(tree) => tree,
            Err(GitError::Http { status: 404, .. }) => {
                return Err(GitError::RefNotFound(reference.to_string()))
            }
            Err(e) => return Err(e),
        };

        if tree.truncated {
            warn!(
                "Tree listing for {} was truncated by GitHub ({} entries)",
                reference,
                tree.tree.len()
            );
        }
        Ok(tree.tree)
    }

    async fn create_blob(&self, content: &str) -> std::result::Result<String, GitError> {
        let request = self.client.post(self.url("blobs")).json(&CreateBlobRequest {
            content,
            encoding: "utf-8",
        });
        let created: ShaResponse = self.send(request).await?;
        Ok(created.sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> std::result::Result<String, GitError> {
        let request = self.client.post(self.url("trees")).json(&CreateTreeRequest {
            base_tree,
            tree: entries,
        });
        let created: ShaResponse = self.send(request).await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        tree_sha: &str,
        parent_sha: &str,
        message: &str,
    ) -> std::result::Result<String, GitError> {
        let request = self
            .client
            .post(self.url("commits"))
            .json(&CreateCommitRequest {
                message,
                tree: tree_sha,
                parents: [parent_sha],
            });
        let created: ShaResponse = self.send(request).await?;
        Ok(created.sha)
    }

    async fn update_ref(
        &self,
        branch: &str,
        expected_old: &str,
        new_sha: &str,
    ) -> std::result::Result<RefUpdate, GitError> {
        let current = self.get_ref(branch).await?;
        if let Some(conflict) = Self::diverged(expected_old, current) {
            debug!("Ref heads/{} moved since {}", branch, expected_old);
            return Ok(conflict);
        }

        let request = self
            .client
            .patch(self.url(&format!("refs/heads/{}", branch)))
            .json(&UpdateRefRequest {
                sha: new_sha,
                force: false,
            });

        match self.send::<RefResponse>(request).await {
            Ok(_) => Ok(RefUpdate::Updated),
            Err(e) if Self::is_fast_forward_rejection(&e) => {
                debug!("Ref heads/{} rejected non-fast-forward update", branch);
                Ok(RefUpdate::Conflict { found: None })
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// GitHub API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateBlobRequest<'a> {
    content: &'a str,
    encoding: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: &'a [TreeEntry],
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::backend::EntryKind;

    fn backend() -> GitHubBackend {
        GitHubBackend::new("octo", "site", SecretString::new("ghp_test_token_value"))
            .unwrap()
            .with_api_url("https://github.example.com/api/v3/")
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            backend().url("ref/heads/main"),
            "https://github.example.com/api/v3/repos/octo/site/git/ref/heads/main"
        );
    }

    #[test]
    fn test_from_settings_requires_token() {
        let settings = GitHubSettings {
            owner: Some("octo".into()),
            repo: Some("site".into()),
            ..Default::default()
        };
        assert!(matches!(
            GitHubBackend::from_settings(&settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_request_bodies() {
        let entries = [TreeEntry::blob("index.html", "b1")];
        let tree = serde_json::to_value(CreateTreeRequest {
            base_tree: "t0",
            tree: &entries,
        })
        .unwrap();
        assert_eq!(
            tree,
            serde_json::json!({
                "base_tree": "t0",
                "tree": [{"path": "index.html", "mode": "100644", "type": "blob", "sha": "b1"}]
            })
        );

        let commit = serde_json::to_value(CreateCommitRequest {
            message: "vibed: x",
            tree: "t1",
            parents: ["abc123"],
        })
        .unwrap();
        assert_eq!(commit["parents"], serde_json::json!(["abc123"]));

        let update = serde_json::to_value(UpdateRefRequest {
            sha: "c1",
            force: false,
        })
        .unwrap();
        assert_eq!(update["force"], false);
    }

    #[test]
    fn test_tree_response_parsing() {
        let tree: TreeResponse = serde_json::from_str(
            r#"{"sha":"t","truncated":false,"tree":[
                {"path":"src","mode":"040000","type":"tree","sha":"s1","url":"u"},
                {"path":"src/a.js","mode":"100644","type":"blob","sha":"s2","size":3,"url":"u"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(tree.tree.len(), 2);
        assert_eq!(tree.tree[1].kind, EntryKind::Blob);
    }

    #[test]
    fn test_moved_ref_is_conflict_before_patch() {
        assert_eq!(GitHubBackend::diverged("abc123", "abc123".to_string()), None);
        assert_eq!(
            GitHubBackend::diverged("abc123", "def456".to_string()),
            Some(RefUpdate::Conflict {
                found: Some("def456".to_string())
            })
        );
    }

    #[test]
    fn test_fast_forward_rejection() {
        let err = GitHubBackend::parse_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Update is not a fast forward","documentation_url":"x"}"#,
        );
        assert!(GitHubBackend::is_fast_forward_rejection(&err));

        let err = GitHubBackend::parse_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Reference does not exist"}"#,
        );
        assert!(!GitHubBackend::is_fast_forward_rejection(&err));
    }
}
