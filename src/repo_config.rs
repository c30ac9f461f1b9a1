use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),
}

/// Body accepted by `POST /config`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepositoryConfig {
    pub repo_url: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryConfig {
    pub repo_url: String,
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl RepositoryConfig {
    pub fn from_raw(raw: RawRepositoryConfig) -> Result<Self, ConfigError> {
        let explicit_owner = raw.owner.filter(|o| !o.trim().is_empty());
        let explicit_name = raw.name.filter(|n| !n.trim().is_empty());

        let (owner, name) = match (explicit_owner, explicit_name) {
            (Some(owner), Some(name)) => (owner, name),
            (owner, name) => {
                let (parsed_owner, parsed_name) = parse_repo_url(&raw.repo_url)?;
                (owner.unwrap_or(parsed_owner), name.unwrap_or(parsed_name))
            }
        };

        Ok(Self {
            repo_url: raw.repo_url,
            owner,
            name,
            default_branch: raw.default_branch.unwrap_or_default(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Splits a repository URL into `(owner, name)`.
///
/// Accepts `https://host/owner/name(.git)`, deeper paths (the last two
/// segments win) and SCP-style `git@host:owner/name.git`.
pub fn parse_repo_url(repo_url: &str) -> Result<(String, String), ConfigError> {
    let invalid = || ConfigError::InvalidRepositoryUrl(repo_url.to_string());

    let trimmed = repo_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let path = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => match trimmed.split_once(':') {
            // git@github.com:owner/name
            Some((host, path)) if host.contains('@') => path.to_string(),
            _ => trimmed.to_string(),
        },
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., owner, name] => Ok((owner.to_string(), name.to_string())),
        _ => Err(invalid()),
    }
}

/// In-memory holder for the single active repository.
#[derive(Debug, Default)]
pub struct RepoConfigStore {
    current: RwLock<Option<RepositoryConfig>>,
}

impl RepoConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalises and stores `raw`, replacing any previous configuration.
    pub fn set_config(&self, raw: RawRepositoryConfig) -> Result<RepositoryConfig, ConfigError> {
        let config = RepositoryConfig::from_raw(raw)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        Ok(config)
    }

    /// `None` until `/config` has been called.
    pub fn get_config(&self) -> Option<RepositoryConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records `branch` for `owner/name`. Returns `false` without writing when
    /// the active repository has changed since the caller took its snapshot.
    pub fn update_default_branch(&self, owner: &str, name: &str, branch: &str) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(config) if config.owner == owner && config.name == name => {
                if config.default_branch != branch {
                    config.default_branch = branch.to_string();
                }
                true
            }
            _ => false,
        }
    }
}
