//! Azure OpenAI chat-completions over plain REST.

use super::{Completion, GenerationBackend, GenerationOptions, Prompt};
use crate::error::{BackendError, QuizError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Connection details for one Azure OpenAI deployment.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    /// REST API version, e.g. `2024-06-01`.
    pub api_version: String,
    /// Deployment (model) name.
    pub deployment: String,
}

impl fmt::Debug for AzureOpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .finish()
    }
}

impl AzureOpenAiConfig {
    /// The chat-completions URL for this deployment.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

/// [`GenerationBackend`] backed by an Azure OpenAI deployment.
pub struct AzureOpenAiBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl AzureOpenAiBackend {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self, QuizError> {
        if config.endpoint.is_empty() || config.api_key.is_empty() || config.deployment.is_empty()
        {
            return Err(QuizError::ProviderNotConfigured {
                provider: "azure-openai".into(),
                hint: "Set AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY and AZURE_OPENAI_MODEL."
                    .into(),
            });
        }
        // No client-level timeout: the orchestrator bounds every call.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| QuizError::ProviderNotConfigured {
                provider: "azure-openai".into(),
                hint: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: config.completions_url(),
            api_key: config.api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Pull the first choice's text out of a chat-completions response body.
fn parse_chat_response(body: &str) -> Result<Completion, BackendError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Transport(format!("malformed response body: {e}")))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(BackendError::EmptyCompletion)?;
    let (prompt_tokens, completion_tokens) = response
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();
    Ok(Completion {
        content,
        prompt_tokens,
        completion_tokens,
    })
}

#[async_trait]
impl GenerationBackend for AzureOpenAiBackend {
    fn name(&self) -> &str {
        "azure-openai"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        let request = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message: String = body.chars().take(300).collect();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Azure OpenAI response: {} bytes", body.len());
        parse_chat_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AzureOpenAiConfig {
        AzureOpenAiConfig {
            endpoint: "https://res.openai.azure.com/".into(),
            api_key: "secret".into(),
            api_version: "2024-06-01".into(),
            deployment: "gpt-4o-mini".into(),
        }
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            config().completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", config());
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let mut c = config();
        c.api_key.clear();
        assert!(matches!(
            AzureOpenAiBackend::new(c),
            Err(QuizError::ProviderNotConfigured { .. })
        ));
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"summary\": \"x\"}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        }"#;
        let c = parse_chat_response(body).unwrap();
        assert_eq!(c.content, r#"{"summary": "x"}"#);
        assert_eq!(c.prompt_tokens, 120);
        assert_eq!(c.completion_tokens, 40);
    }

    #[test]
    fn empty_choices_is_empty_completion() {
        assert_eq!(
            parse_chat_response(r#"{"choices": []}"#),
            Err(BackendError::EmptyCompletion)
        );
        assert_eq!(
            parse_chat_response(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(BackendError::EmptyCompletion)
        );
    }

    #[test]
    fn malformed_body_is_transport_error() {
        assert!(matches!(
            parse_chat_response("<html>bad gateway</html>"),
            Err(BackendError::Transport(_))
        ));
    }
}
