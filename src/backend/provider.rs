//! Adapter from an `edgequake_llm` provider to [`GenerationBackend`].

use super::{Completion, GenerationBackend, GenerationOptions, Prompt};
use crate::error::{BackendError, QuizError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without one.
pub(crate) const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Environment variable naming the provider for auto-detection.
pub const PROVIDER_ENV: &str = "EDGEQUAKE_LLM_PROVIDER";

/// Environment variable naming the model for auto-detection.
pub const MODEL_ENV: &str = "EDGEQUAKE_MODEL";

/// [`GenerationBackend`] backed by any edgequake-llm provider.
pub struct LlmProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmProviderBackend {
    /// Wrap a pre-built provider. Useful when the caller adds its own
    /// middleware (rate limiting, tracing) around the provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Instantiate a named provider with the given model. The provider reads
    /// its own API key (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, QuizError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            QuizError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name))
    }

    /// Auto-detect a provider from the environment.
    ///
    /// [`PROVIDER_ENV`] + [`MODEL_ENV`] win when both are set;
    /// otherwise OpenAI is preferred when `OPENAI_API_KEY` is present; as a
    /// last resort edgequake-llm scans every known key variable.
    pub fn from_env(model: Option<&str>) -> Result<Self, QuizError> {
        if let (Ok(prov), Ok(env_model)) = (
            std::env::var(PROVIDER_ENV),
            std::env::var(MODEL_ENV),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return Self::from_name(&prov, &env_model);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                return Self::from_name("openai", model.unwrap_or(DEFAULT_MODEL));
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| QuizError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set AZURE_OPENAI_* or OPENAI_API_KEY / ANTHROPIC_API_KEY.\n\
                    Error: {}",
                    e
                ),
            })?;

        Ok(Self::new(llm_provider, "auto"))
    }
}

#[async_trait]
impl GenerationBackend for LlmProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.user.as_str()),
        ];
        let completion_options = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&completion_options))
            .await
            .map_err(|e| BackendError::Provider(format!("{e}")))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(BackendError::EmptyCompletion);
        }

        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}
