//! The generation backend: prompt in, raw completion out.
//!
//! The pipeline only ever sees [`GenerationBackend`], a single-method,
//! stateless capability shared read-only by every request. Retry state,
//! timeouts and parsing all live on the caller's side
//! ([`crate::pipeline::generate`]), so an implementation is one plain
//! request/response call.
//!
//! Two implementations ship with the crate:
//!
//! * [`AzureOpenAiBackend`] — talks to an Azure OpenAI deployment directly
//!   over REST (endpoint, key, API version, deployment name).
//! * [`LlmProviderBackend`] — wraps any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Gemini, Ollama, …).
//!
//! [`resolve_backend`] picks one from [`BackendSettings`].

mod azure;
mod provider;

pub use azure::{AzureOpenAiBackend, AzureOpenAiConfig};
pub use provider::{LlmProviderBackend, MODEL_ENV, PROVIDER_ENV};

use crate::error::{BackendError, QuizError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// A fully rendered request: fixed system instruction + per-segment user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Sampling options forwarded with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A raw completion plus token accounting (zero when the backend does not report it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl Completion {
    /// A completion with no token accounting.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can turn a prompt into a single, complete text completion.
///
/// Implementations must be safe to share across concurrent requests and must
/// not retry internally: a failed call is reported as [`BackendError`] and
/// the orchestrator decides what happens next.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError>;
}

/// How to build the process-wide backend.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    /// Azure OpenAI deployment. Takes precedence when set.
    pub azure: Option<AzureOpenAiConfig>,
    /// edgequake-llm provider name (`openai`, `anthropic`, `gemini`, `ollama`, …).
    pub provider_name: Option<String>,
    /// Model identifier for `provider_name`.
    pub model: Option<String>,
}

/// Resolve the backend, from most-specific to least-specific:
///
/// 1. **Azure deployment** (`settings.azure`) — endpoint, key, API version
///    and deployment all configured.
/// 2. **Named provider + model** (`settings.provider_name`).
/// 3. **Environment** — `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, then
///    `OPENAI_API_KEY`, then full edgequake-llm auto-detection.
pub fn resolve_backend(settings: &BackendSettings) -> Result<Arc<dyn GenerationBackend>, QuizError> {
    if let Some(ref azure) = settings.azure {
        info!(
            "Using Azure OpenAI deployment '{}' at {}",
            azure.deployment, azure.endpoint
        );
        return Ok(Arc::new(AzureOpenAiBackend::new(azure.clone())?));
    }

    if let Some(ref name) = settings.provider_name {
        let model = settings.model.as_deref().unwrap_or(provider::DEFAULT_MODEL);
        info!("Using provider '{}' with model '{}'", name, model);
        return Ok(Arc::new(LlmProviderBackend::from_name(name, model)?));
    }

    Ok(Arc::new(LlmProviderBackend::from_env(settings.model.as_deref())?))
}
