//! Configuration for the OpenAI-compatible provider.
//!
//! Built from the `[llm]` section of `config.toml`. The provider name and
//! capability limits are inferred from the base URL for well-known hosts.

use std::time::Duration;

use secrecy::SecretString;

use mnemo_types::config::LlmConfig;
use mnemo_types::llm::ProviderCapabilities;

/// Configuration for an OpenAI-compatible LLM provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "ollama").
    pub provider_name: String,
    pub base_url: String,
    /// `None` for local servers that do not check keys.
    pub api_key: Option<SecretString>,
    /// Default model when a request leaves `model` empty.
    pub model: String,
    pub timeout: Duration,
    pub capabilities: ProviderCapabilities,
}

impl OpenAiCompatConfig {
    pub fn from_llm_config(config: &LlmConfig, api_key: Option<SecretString>) -> Self {
        let provider_name = infer_provider_name(&config.base_url);
        let capabilities = default_capabilities(provider_name);
        Self {
            provider_name: provider_name.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            capabilities,
        }
    }
}

/// Name a provider after its host.
pub fn infer_provider_name(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("generativelanguage.googleapis.com") {
        "gemini"
    } else if base_url.contains("api.mistral.ai") {
        "mistral"
    } else if base_url.contains(":11434") {
        "ollama"
    } else {
        "openai_compatible"
    }
}

fn default_capabilities(provider_name: &str) -> ProviderCapabilities {
    match provider_name {
        "gemini" => ProviderCapabilities {
            max_context_tokens: 1_000_000,
            max_output_tokens: 65_536,
        },
        "mistral" => ProviderCapabilities {
            max_context_tokens: 128_000,
            max_output_tokens: 32_768,
        },
        "ollama" => ProviderCapabilities {
            max_context_tokens: 8_192,
            max_output_tokens: 4_096,
        },
        _ => ProviderCapabilities {
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}
