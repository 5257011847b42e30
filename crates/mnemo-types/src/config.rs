//! Configuration types for mnemo.
//!
//! `MnemoConfig` represents the `config.toml` in the data directory. Every
//! field has a default, so an empty or partial file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MnemoConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// What happens to raw turns once they are folded into a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Rows stay in storage and are excluded from the active context.
    #[default]
    Archive,
    /// Summarized rows that are already indexed are removed.
    Delete,
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPolicy::Archive => write!(f, "archive"),
            RetentionPolicy::Delete => write!(f, "delete"),
        }
    }
}

/// Recall, summarization and retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Results must score strictly above this similarity.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Number of similar turns recalled into the response context.
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    #[serde(default = "default_summarize_after_turns")]
    pub summarize_after_turns: usize,

    /// Estimated token count (chars / 4) that also triggers a summary.
    #[serde(default)]
    pub summarize_token_budget: Option<usize>,

    /// Newest active turns left raw when summarizing.
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,

    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_similarity_threshold() -> f32 {
    0.6
}

fn default_recall_limit() -> usize {
    3
}

fn default_summarize_after_turns() -> usize {
    6
}

fn default_keep_recent_turns() -> usize {
    2
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            recall_limit: default_recall_limit(),
            summarize_after_turns: default_summarize_after_turns(),
            summarize_token_budget: None,
            keep_recent_turns: default_keep_recent_turns(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Background maintenance queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// A thread's worker exits after this long without jobs.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    2_000
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_mailbox_capacity() -> usize {
    256
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX model via fastembed.
    #[default]
    Fastembed,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Must match what the model actually produces.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Chat model used for responses, entity extraction and summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for user-facing responses. Extraction and
    /// summarization always run at 0.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = MnemoConfig::default();
        assert!((config.memory.similarity_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.memory.recall_limit, 3);
        assert_eq!(config.memory.summarize_after_turns, 6);
        assert_eq!(config.memory.keep_recent_turns, 2);
        assert_eq!(config.memory.retention, RetentionPolicy::Archive);
        assert_eq!(config.maintenance.max_attempts, 3);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Fastembed);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: MnemoConfig = toml::from_str("").unwrap();
        assert_eq!(config, MnemoConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
[memory]
retention = "delete"
summarize_token_budget = 2000

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimension = 1536

[llm]
model = "llama3.1"
base_url = "http://localhost:11434/v1"
"#;
        let config: MnemoConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.retention, RetentionPolicy::Delete);
        assert_eq!(config.memory.summarize_token_budget, Some(2000));
        assert_eq!(config.memory.recall_limit, 3);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Openai);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.maintenance, MaintenanceConfig::default());
    }

    #[test]
    fn test_unknown_retention_is_rejected() {
        let result: Result<MnemoConfig, _> = toml::from_str("[memory]\nretention = \"shred\"\n");
        assert!(result.is_err());
    }
}
