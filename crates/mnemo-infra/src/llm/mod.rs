//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `mnemo-core`, a factory ([`create_provider`]) that builds
//! it from `[llm]` configuration, and a connection test.
//!
//! [`LlmProvider`]: mnemo_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use mnemo_core::llm::box_provider::BoxLlmProvider;
use mnemo_types::config::LlmConfig;
use mnemo_types::llm::{CompletionRequest, LlmError, Message};

use self::openai_compat::config::OpenAiCompatConfig;
use self::openai_compat::OpenAiCompatibleProvider;

/// Create a [`BoxLlmProvider`] from `[llm]` configuration.
///
/// A hosted provider without a key is still built (commands that never
/// call the model keep working); its requests fail with
/// [`LlmError::AuthenticationFailed`].
pub fn create_provider(config: &LlmConfig, api_key: Option<SecretString>) -> BoxLlmProvider {
    let oai_config = OpenAiCompatConfig::from_llm_config(config, api_key);
    if requires_api_key(&oai_config.provider_name) && oai_config.api_key.is_none() {
        tracing::warn!(
            provider = %oai_config.provider_name,
            env = %config.api_key_env,
            "no API key configured; chat and maintenance LLM calls will fail"
        );
    }
    BoxLlmProvider::new(OpenAiCompatibleProvider::new(oai_config))
}

/// Hosted providers reject unauthenticated requests.
pub fn requires_api_key(provider_name: &str) -> bool {
    matches!(provider_name, "openai" | "gemini" | "mistral")
}

/// Test provider connectivity by sending a minimal completion request.
pub async fn test_provider_connection(provider: &BoxLlmProvider) -> Result<(), LlmError> {
    let request = CompletionRequest {
        model: String::new(), // Provider uses its configured default
        messages: vec![Message::user("Hello")],
        system: None,
        max_tokens: 10,
        temperature: Some(0.0),
        stop_sequences: None,
    };
    provider.complete(&request).await?;
    Ok(())
}
