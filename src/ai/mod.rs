//! Content-generation collaborator: drafts PR titles and descriptions.

pub mod openai;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::github::ChangeDescriptor;

pub use openai::OpenAiGenerator;

/// Everything the generator gets to see about a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoInfo {
    pub branch_name: String,
    /// Never empty once the pipeline has built it.
    pub commit_message: String,
    pub changes: BTreeMap<String, ChangeDescriptor>,
    pub diff_url: Option<String>,
    pub contributing_guide: Option<String>,
}

impl RepoInfo {
    /// Plain-text rendering used as the user prompt.
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "Branch: {}\nCommit message:\n{}\n",
            self.branch_name,
            self.commit_message.trim()
        );

        if let Some(url) = &self.diff_url {
            prompt.push_str(&format!("Diff: {url}\n"));
        }

        if !self.changes.is_empty() {
            prompt.push_str("\nChanged files:\n");
            for (path, change) in &self.changes {
                prompt.push_str(&format!(
                    "- {path} ({}, +{} -{})\n",
                    change.status, change.additions, change.deletions
                ));
                if let Some(patch) = &change.patch {
                    prompt.push_str("```diff\n");
                    prompt.push_str(patch);
                    prompt.push_str("\n```\n");
                }
            }
        }

        prompt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrContent {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response could not be decoded: {0}")]
    Decode(String),

    #[error("model returned an empty {0}")]
    Empty(&'static str),

    #[error("content generator is not configured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, info: &RepoInfo) -> Result<PrContent, GeneratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_changes_and_patches() {
        let mut changes = BTreeMap::new();
        changes.insert(
            "src/lib.rs".to_string(),
            ChangeDescriptor {
                status: "modified".to_string(),
                additions: 2,
                deletions: 1,
                patch: Some("@@ -1 +1 @@".to_string()),
            },
        );
        let info = RepoInfo {
            branch_name: "feature/x".to_string(),
            commit_message: "fix: bug\n".to_string(),
            changes,
            diff_url: Some("https://example.test/d.diff".to_string()),
            contributing_guide: None,
        };

        let prompt = info.to_prompt();
        assert!(prompt.starts_with("Branch: feature/x\nCommit message:\nfix: bug\n"));
        assert!(prompt.contains("Diff: https://example.test/d.diff"));
        assert!(prompt.contains("- src/lib.rs (modified, +2 -1)"));
        assert!(prompt.contains("```diff\n@@ -1 +1 @@\n```"));
    }

    #[test]
    fn prompt_without_diff_is_commit_only() {
        let info = RepoInfo {
            branch_name: "main".to_string(),
            commit_message: "chore: tidy".to_string(),
            ..RepoInfo::default()
        };
        assert_eq!(info.to_prompt(), "Branch: main\nCommit message:\nchore: tidy\n");
    }
}
