//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository/index traits, but AppState pins them
//! to the concrete infra implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use mnemo_core::conversation::engine::ConversationEngine;
use mnemo_core::llm::box_provider::BoxLlmProvider;
use mnemo_core::maintenance::pipeline::MaintenancePipeline;
use mnemo_core::maintenance::queue::MaintenanceQueue;
use mnemo_core::maintenance::JobRunner;
use mnemo_core::memory::box_embedder::BoxEmbedder;
use mnemo_core::memory::embedder::Embedder;
use mnemo_core::memory::extractor::EntityExtractor;
use mnemo_core::memory::service::MemoryService;
use mnemo_core::memory::summarizer::Summarizer;
use mnemo_infra::config::{api_key, load_config, resolve_data_dir};
use mnemo_infra::llm::create_provider;
use mnemo_infra::sqlite::job::SqliteJobRepository;
use mnemo_infra::sqlite::pool::{database_url, DatabasePool};
use mnemo_infra::sqlite::profile::SqliteProfileRepository;
use mnemo_infra::sqlite::summary::SqliteSummaryRepository;
use mnemo_infra::sqlite::turn::SqliteTurnRepository;
use mnemo_infra::vector::embedder::FastEmbedder;
use mnemo_infra::vector::http_embedder::HttpEmbedder;
use mnemo_infra::vector::lance::LanceVectorStore;
use mnemo_infra::vector::turn_index::LanceTurnIndex;
use mnemo_types::config::{EmbeddingProvider, MnemoConfig};

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteMemoryService = MemoryService<
    SqliteTurnRepository,
    SqliteProfileRepository,
    SqliteSummaryRepository,
    LanceTurnIndex,
>;

pub type ConcreteEngine = ConversationEngine<
    SqliteTurnRepository,
    SqliteProfileRepository,
    SqliteSummaryRepository,
    LanceTurnIndex,
    SqliteJobRepository,
>;

pub type ConcreteQueue = MaintenanceQueue<SqliteJobRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub provider: Arc<BoxLlmProvider>,
    pub config: Arc<MnemoConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the
    /// database and vector store, build the embedder and LLM provider.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let embedder = build_embedder(&config, &data_dir).await?;
        let provider = create_provider(&config.llm, api_key(&config.llm.api_key_env));

        Self::build(data_dir, config, embedder, provider).await
    }

    /// Wire services from an already-resolved embedder and provider.
    pub async fn build(
        data_dir: PathBuf,
        config: MnemoConfig,
        embedder: BoxEmbedder,
        provider: BoxLlmProvider,
    ) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open database")?;

        let store = LanceVectorStore::new(data_dir.join("vectors"))
            .await
            .context("failed to open vector store")?;
        let index = LanceTurnIndex::new(store, embedder.dimension());

        let memory = Arc::new(MemoryService::new(
            SqliteTurnRepository::new(db_pool.clone()),
            SqliteProfileRepository::new(db_pool.clone()),
            SqliteSummaryRepository::new(db_pool.clone()),
            index,
            Arc::new(embedder),
            config.memory.clone(),
        ));

        let provider = Arc::new(provider);
        let pipeline = MaintenancePipeline::new(
            Arc::clone(&memory),
            EntityExtractor::new(Arc::clone(&provider), config.llm.model.clone()),
            Summarizer::new(Arc::clone(&provider), config.llm.model.clone()),
        );
        let runner: Arc<dyn JobRunner> = Arc::new(pipeline);
        let queue = MaintenanceQueue::new(
            SqliteJobRepository::new(db_pool.clone()),
            runner,
            config.maintenance.clone(),
        );

        let engine = ConversationEngine::new(
            memory,
            Arc::clone(&provider),
            queue,
            config.llm.clone(),
        );

        Ok(Self {
            engine: Arc::new(engine),
            provider,
            config: Arc::new(config),
            data_dir,
            db_pool,
        })
    }

    pub fn memory(&self) -> &Arc<ConcreteMemoryService> {
        self.engine.memory()
    }

    pub fn queue(&self) -> &ConcreteQueue {
        self.engine.queue()
    }

    /// Re-dispatch maintenance jobs persisted by an earlier run.
    pub async fn recover_jobs(&self) -> anyhow::Result<usize> {
        self.queue()
            .recover()
            .await
            .context("failed to recover pending maintenance jobs")
    }
}

/// Build the embedder selected by `[embedding] provider`.
async fn build_embedder(config: &MnemoConfig, data_dir: &Path) -> anyhow::Result<BoxEmbedder> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingProvider::Fastembed => {
            let embedder = FastEmbedder::new(&embedding.model, data_dir.join("models"))
                .await
                .with_context(|| format!("failed to load embedding model '{}'", embedding.model))?;
            if embedder.dimension() != embedding.dimension {
                tracing::warn!(
                    configured = embedding.dimension,
                    actual = embedder.dimension(),
                    "embedding.dimension ignored; using the model's native dimension"
                );
            }
            Ok(BoxEmbedder::new(embedder))
        }
        EmbeddingProvider::Openai => {
            let embedder = HttpEmbedder::new(
                embedding.base_url.clone(),
                api_key(&embedding.api_key_env),
                embedding.model.clone(),
                embedding.dimension,
                Duration::from_secs(embedding.timeout_secs),
            )
            .context("failed to build embedding client")?;
            Ok(BoxEmbedder::new(embedder))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic embedder and canned LLM for exercising the CLI and
    //! HTTP layers without model downloads or network access.

    use super::*;

    use mnemo_core::llm::provider::LlmProvider;
    use mnemo_types::error::RepositoryError;
    use mnemo_types::llm::{
        CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, Usage,
    };

    pub const DIM: usize = 8;

    /// Bag-of-letters embedding: texts sharing words land close together.
    pub struct LetterEmbedder;

    impl Embedder for LetterEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; DIM];
                    for b in t.to_lowercase().bytes().filter(u8::is_ascii_alphabetic) {
                        v[(b - b'a') as usize % DIM] += 1.0;
                    }
                    if v.iter().all(|x| *x == 0.0) {
                        v[0] = 1.0;
                    }
                    v
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "letters"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    /// Answers chat prompts with "ok", extraction prompts with a fixed
    /// profile and summary prompts with a fixed summary.
    pub struct CannedLlm {
        capabilities: ProviderCapabilities,
    }

    impl CannedLlm {
        pub fn new() -> Self {
            Self {
                capabilities: ProviderCapabilities {
                    max_context_tokens: 8_192,
                    max_output_tokens: 1_024,
                },
            }
        }
    }

    impl LlmProvider for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }

        fn capabilities(&self) -> &ProviderCapabilities {
            &self.capabilities
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let system = request.system.as_deref().unwrap_or_default();
            let content = if system.starts_with("You extract durable facts") {
                r#"{"location": "New York"}"#.to_string()
            } else if system.starts_with("You maintain a running summary") {
                "The user lives in New York.".to_string()
            } else {
                "ok".to_string()
            };
            Ok(CompletionResponse {
                id: "canned-1".to_string(),
                content,
                model: "canned".to_string(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    pub async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::build(
            dir.path().to_path_buf(),
            MnemoConfig::default(),
            BoxEmbedder::new(LetterEmbedder),
            BoxLlmProvider::new(CannedLlm::new()),
        )
        .await
        .unwrap();
        (state, dir)
    }
}
