use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ContentGenerator, GeneratorError, PrContent, RepoInfo};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_GUIDE_CHARS: usize = 4_000;

const TITLE_SYSTEM_PROMPT: &str = "You write pull request titles. Reply with one concise, \
descriptive title in imperative mood, at most 72 characters, without quotes or markdown.";
const DESCRIPTION_SYSTEM_PROMPT: &str = "You write pull request descriptions in GitHub \
markdown. Summarise what changed and why, list notable changes, and mention anything \
reviewers should check. Do not invent changes that are not in the context.";

/// OpenAI-compatible chat-completions generator.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GeneratorError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeneratorError::Configuration(
                "OPENAI_API_KEY is empty".to_string(),
            ));
        }

        Ok(Self {
            http: Client::builder().timeout(DEFAULT_TIMEOUT).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, GeneratorError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Decode(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

/// First non-empty line, without wrapping quotes or a leading markdown heading.
fn clean_title(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

fn description_prompt(info: &RepoInfo) -> String {
    let mut prompt = format!(
        "Write a pull request description for these changes:\n\n{}",
        info.to_prompt()
    );
    if let Some(guide) = &info.contributing_guide {
        let guide: String = guide.chars().take(MAX_GUIDE_CHARS).collect();
        prompt.push_str(&format!(
            "\nFollow the repository's contributing guidelines:\n{guide}\n"
        ));
    }
    prompt
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, info: &RepoInfo) -> Result<PrContent, GeneratorError> {
        let raw_title = self
            .complete(
                TITLE_SYSTEM_PROMPT,
                format!(
                    "Write a pull request title for these changes:\n\n{}",
                    info.to_prompt()
                ),
            )
            .await?;
        let title = clean_title(&raw_title);
        if title.is_empty() {
            return Err(GeneratorError::Empty("title"));
        }
        debug!(%title, "generated title");

        let description = self
            .complete(DESCRIPTION_SYSTEM_PROMPT, description_prompt(info))
            .await?
            .trim()
            .to_string();
        if description.is_empty() {
            return Err(GeneratorError::Empty("description"));
        }

        Ok(PrContent { title, description })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    fn info() -> RepoInfo {
        RepoInfo {
            branch_name: "feature/x".to_string(),
            commit_message: "fix: bug".to_string(),
            contributing_guide: Some("Use conventional commits.".to_string()),
            ..RepoInfo::default()
        }
    }

    #[rstest]
    #[case("Fix the bug", "Fix the bug")]
    #[case("\"Fix the bug\"\n", "Fix the bug")]
    #[case("\n# Fix the bug\nmore text", "Fix the bug")]
    #[case("`Fix`", "Fix")]
    #[case("   \n  ", "")]
    fn titles_are_cleaned(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_title(raw), expected);
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = OpenAiGenerator::new(DEFAULT_BASE_URL, DEFAULT_MODEL, " ").unwrap_err();
        assert!(matches!(err, GeneratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn generates_title_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("pull request title"))
            .respond_with(completion("\"Fix crash on empty input\""))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("contributing guidelines"))
            .respond_with(completion("## Summary\nFixes the crash.\n"))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(server.uri(), "gpt-test", "sk-test").unwrap();
        let content = generator.generate(&info()).await.unwrap();

        assert_eq!(content.title, "Fix crash on empty input");
        assert_eq!(content.description, "## Summary\nFixes the crash.");
    }

    #[tokio::test]
    async fn api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(server.uri(), "gpt-test", "sk-test").unwrap();
        let err = generator.generate(&info()).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_choices_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(server.uri(), "gpt-test", "sk-test").unwrap();
        let err = generator.generate(&info()).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Empty("title")));
    }
}
