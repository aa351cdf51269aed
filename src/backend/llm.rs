//! Direct multimodal LLM backend built on `edgequake-llm`.
//!
//! ## Message Layout
//!
//! Each request sends exactly two messages:
//! 1. **System message**: the document-comprehension prompt (or an override)
//! 2. **User message**: `"{QUESTION_PREAMBLE} : {prompt}"` with every page
//!    image attached at `detail: "high"`
//!
//! The provider call is made once. Parse retries and timeouts are the
//! orchestrator's and invoker's business.

use super::{Attachment, GenerationBackend, GenerationRequest, PayloadKind};
use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::pipeline::encode;
use crate::prompts::{user_turn, SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Backend that talks to a vision-capable LLM provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &VerifyConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }

    /// Resolve a provider from `config` and the environment.
    pub fn from_config(config: &VerifyConfig) -> Result<Self, VerifyError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_messages(&self, request: &GenerationRequest) -> Vec<ChatMessage> {
        let images = request.attachments.iter().map(image_of).collect();
        vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images(&user_turn(&request.prompt), images),
        ]
    }
}

fn image_of(attachment: &Attachment) -> edgequake_llm::ImageData {
    encode::image_data(&attachment.mime_type, &attachment.data)
}

#[async_trait]
impl GenerationBackend for LlmBackend {
    fn name(&self) -> &str {
        "llm"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::PageImages
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, VerifyError> {
        let messages = self.build_messages(request);
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| VerifyError::Backend(format!("{}", e)))?;

        debug!(
            "LLM reply: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the verification config.
fn build_options(config: &VerifyConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, VerifyError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        VerifyError::InvalidConfig(format!(
            "LLM provider '{}' could not be created: {}",
            provider_name, e
        ))
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(config: &VerifyConfig) -> Result<Arc<dyn LLMProvider>, VerifyError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        info!("Using LLM provider '{}' with model '{}'", name, model);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            info!("Using LLM provider '{}' with model '{}' from environment", prov, model);
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        VerifyError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment. \
             Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider. Error: {}",
            e
        ))
    })?;

    Ok(llm_provider)
}
