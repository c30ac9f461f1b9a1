//! Local git hooks and the GitHub push webhook that feed `/push`.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::github::{GitHubClient, GitHubError};

pub const HOOK_NAMES: [&str; 2] = ["post-commit", "pre-push"];
const HOOK_MARKER: &str = "# installed by prwright";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0} is not a git repository")]
    NotAGitRepository(PathBuf),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} was not installed by prwright, refusing to touch it")]
    ForeignHook(PathBuf),

    #[error("a GitHub token is required for webhook management")]
    MissingGitHubClient,

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

#[async_trait]
pub trait HookManager: Send + Sync {
    fn validate_git_repo(&self, repo: &Path) -> Result<(), HookError>;

    async fn install_hooks(&self, repo: &Path, server_url: &str) -> Result<Vec<PathBuf>, HookError>;

    async fn remove_hooks(&self, repo: &Path) -> Result<usize, HookError>;

    /// Returns the hook id; an existing hook for the same URL is reused.
    async fn register_webhook(&self, owner: &str, repo: &str, server_url: &str)
        -> Result<u64, HookError>;

    /// Returns how many hooks were deleted.
    async fn deregister_webhook(&self, owner: &str, repo: &str, server_url: &str)
        -> Result<usize, HookError>;
}

pub struct GitHookManager {
    github: Option<GitHubClient>,
    secret: Option<String>,
}

impl GitHookManager {
    /// Filesystem-only manager, enough for installing local hooks.
    pub fn local() -> Self {
        Self {
            github: None,
            secret: None,
        }
    }

    pub fn with_github(github: GitHubClient, secret: Option<String>) -> Self {
        Self {
            github: Some(github),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    fn github(&self) -> Result<&GitHubClient, HookError> {
        self.github.as_ref().ok_or(HookError::MissingGitHubClient)
    }
}

pub fn push_url(server_url: &str) -> String {
    format!("{}/push", server_url.trim_end_matches('/'))
}

fn hooks_dir(repo: &Path) -> PathBuf {
    repo.join(".git").join("hooks")
}

/// The script never fails the git command it is attached to. With
/// `PRWRIGHT_WEBHOOK_SECRET` exported it signs the body the way GitHub does.
fn hook_script(name: &str, server_url: &str) -> String {
    let url = push_url(server_url).replace('\'', "");
    format!(
        r#"#!/bin/sh
{HOOK_MARKER} ({name})
[ -n "$PRWRIGHT_DISABLED" ] && exit 0
branch=$(git rev-parse --abbrev-ref HEAD 2>/dev/null) || exit 0
sha=$(git rev-parse HEAD 2>/dev/null) || exit 0
body="{{\"ref\":\"refs/heads/$branch\",\"sha\":\"$sha\"}}"
set -- -H 'Content-Type: application/json'
if [ -n "$PRWRIGHT_WEBHOOK_SECRET" ]; then
    sig=$(printf '%s' "$body" | openssl dgst -sha256 -hmac "$PRWRIGHT_WEBHOOK_SECRET" 2>/dev/null | sed 's/^.*= //')
    [ -n "$sig" ] && set -- "$@" -H "X-Hub-Signature-256: sha256=$sig"
fi
curl -s -m 10 -X POST "$@" -d "$body" '{url}' >/dev/null 2>&1 || true
exit 0
"#
    )
}

fn is_ours(path: &Path) -> Result<bool, HookError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.contains(HOOK_MARKER)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        // Binary or unreadable hooks belong to someone else.
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Ok(false),
        Err(source) => Err(HookError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_executable(path: &Path, content: &str) -> Result<(), HookError> {
    let io_err = |source| HookError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, content).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_err)?;
    }
    Ok(())
}

#[async_trait]
impl HookManager for GitHookManager {
    fn validate_git_repo(&self, repo: &Path) -> Result<(), HookError> {
        if repo.join(".git").exists() {
            Ok(())
        } else {
            Err(HookError::NotAGitRepository(repo.to_path_buf()))
        }
    }

    async fn install_hooks(&self, repo: &Path, server_url: &str) -> Result<Vec<PathBuf>, HookError> {
        self.validate_git_repo(repo)?;
        let dir = hooks_dir(repo);
        fs::create_dir_all(&dir).map_err(|source| HookError::Io {
            path: dir.clone(),
            source,
        })?;

        // Check every target first so a foreign hook leaves nothing half-installed.
        let paths: Vec<PathBuf> = HOOK_NAMES.iter().map(|name| dir.join(name)).collect();
        for path in &paths {
            if !is_ours(path)? {
                return Err(HookError::ForeignHook(path.clone()));
            }
        }

        for (name, path) in HOOK_NAMES.iter().zip(&paths) {
            write_executable(path, &hook_script(name, server_url))?;
            debug!(hook = %path.display(), "hook written");
        }
        info!(repo = %repo.display(), server = server_url, "git hooks installed");
        Ok(paths)
    }

    async fn remove_hooks(&self, repo: &Path) -> Result<usize, HookError> {
        self.validate_git_repo(repo)?;
        let dir = hooks_dir(repo);
        let mut removed = 0;

        for name in HOOK_NAMES {
            let path = dir.join(name);
            if !path.exists() || !is_ours(&path)? {
                continue;
            }
            fs::remove_file(&path).map_err(|source| HookError::Io {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
        info!(repo = %repo.display(), removed, "git hooks removed");
        Ok(removed)
    }

    async fn register_webhook(
        &self,
        owner: &str,
        repo: &str,
        server_url: &str,
    ) -> Result<u64, HookError> {
        let github = self.github()?;
        let target = push_url(server_url);

        let existing = github.list_hooks(owner, repo).await?;
        if let Some((id, _)) = existing.iter().find(|(_, url)| *url == target) {
            info!(id, url = %target, "webhook already registered");
            return Ok(*id);
        }

        let id = github
            .create_push_hook(owner, repo, &target, self.secret.as_deref())
            .await?;
        info!(id, url = %target, "webhook registered");
        Ok(id)
    }

    async fn deregister_webhook(
        &self,
        owner: &str,
        repo: &str,
        server_url: &str,
    ) -> Result<usize, HookError> {
        let github = self.github()?;
        let target = push_url(server_url);

        let mut deleted = 0;
        for (id, url) in github.list_hooks(owner, repo).await? {
            if url == target {
                github.delete_hook(owner, repo, id).await?;
                deleted += 1;
            }
        }
        info!(deleted, url = %target, "webhook deregistered");
        Ok(deleted)
    }
}
