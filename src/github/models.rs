use serde::{Deserialize, Serialize};

/// Push webhook payload. Covers both GitHub deliveries and the smaller
/// `{"ref","sha"}` body posted by the installed git hooks.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GitHubPushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default, alias = "sha")]
    pub after: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub deleted: bool,
}

const HEADS_PREFIX: &str = "refs/heads/";

impl GitHubPushEvent {
    /// Legacy plain-text body: the first non-empty line is the commit SHA and
    /// doubles as the branch name.
    pub fn from_text(body: &str) -> Option<Self> {
        let sha = body.lines().map(str::trim).find(|l| !l.is_empty())?;
        Some(Self {
            git_ref: format!("{HEADS_PREFIX}{sha}"),
            after: sha.to_string(),
            before: String::new(),
            deleted: false,
        })
    }

    pub fn branch_name(&self) -> &str {
        self.git_ref
            .strip_prefix(HEADS_PREFIX)
            .unwrap_or(&self.git_ref)
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct RepositoryResponse {
    pub default_branch: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CompareResponse {
    #[serde(default)]
    pub diff_url: Option<String>,
    #[serde(default)]
    pub files: Vec<CompareFile>,
    #[serde(default)]
    pub commits: Vec<RepoCommit>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CompareFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GitCommit {
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RepoCommit {
    pub commit: GitCommit,
}

#[derive(Serialize, Debug)]
pub(crate) struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    pub maintainer_can_modify: bool,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PullRequestResponse {
    pub number: u64,
    pub html_url: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct LabelsRequest<'a> {
    pub labels: &'a [String],
}

#[derive(Deserialize, Debug)]
pub(crate) struct HookResponse {
    pub id: u64,
    #[serde(default)]
    pub config: HookConfig,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub(crate) struct HookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct NewHook<'a> {
    pub name: &'static str,
    pub active: bool,
    pub events: &'a [&'static str],
    pub config: HookConfig,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("refs/heads/main", "main")]
    #[case("refs/heads/feature/x", "feature/x")]
    #[case("refs/heads/refs/heads/odd", "refs/heads/odd")]
    #[case("feature/bare", "feature/bare")]
    fn branch_name_strips_heads_prefix(#[case] git_ref: &str, #[case] branch: &str) {
        let event: GitHubPushEvent =
            serde_json::from_value(serde_json::json!({ "ref": git_ref, "after": "abc" })).unwrap();
        assert_eq!(event.branch_name(), branch);
    }

    #[test]
    fn hook_payload_uses_sha_alias() {
        let event: GitHubPushEvent =
            serde_json::from_str(r#"{"ref":"refs/heads/feature/x","sha":"abc123"}"#).unwrap();
        assert_eq!(event.after, "abc123");
        assert_eq!(event.branch_name(), "feature/x");
        assert!(!event.deleted);
    }

    #[test]
    fn github_delivery_ignores_unknown_fields() {
        let event: GitHubPushEvent = serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/main",
            "before": "3fed5c80",
            "after": "2344c05c",
            "repository": { "full_name": "acme/widgets" },
            "deleted": false,
        }))
        .unwrap();
        assert_eq!(event.before, "3fed5c80");
        assert_eq!(event.after, "2344c05c");
    }

    #[test]
    fn text_body_uses_first_non_empty_line() {
        let event = GitHubPushEvent::from_text("\n  deadbeef \nignored\n").unwrap();
        assert_eq!(event.after, "deadbeef");
        assert_eq!(event.git_ref, "refs/heads/deadbeef");
        assert_eq!(event.branch_name(), "deadbeef");
    }

    #[test]
    fn empty_text_body_is_rejected() {
        assert!(GitHubPushEvent::from_text("  \n\n").is_none());
    }
}
