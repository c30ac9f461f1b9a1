use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub returned {status} for {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("unexpected GitHub response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("not a commit SHA: {0:?}")]
    InvalidSha(String),
}

impl GitHubError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Status { status, .. } => Some(*status),
            GitHubError::Transport(err) => err.status().map(|s| s.as_u16()),
            GitHubError::Decode { .. } | GitHubError::InvalidSha(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
