//! FastEmbed-based local embedding generator.
//!
//! Implements the `Embedder` trait from `mnemo-core` with ONNX runtime
//! inference. The model is downloaded into `{data_dir}/models` on first use.
//! Inference is CPU-bound, so it runs on the blocking thread pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use mnemo_core::memory::embedder::Embedder;
use mnemo_types::error::RepositoryError;

/// Models that can be selected by name in `[embedding] model`.
pub fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => Some((EmbeddingModel::BGELargeENV15, 1024)),
        "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
            Some((EmbeddingModel::AllMiniLML6V2, 384))
        }
        _ => None,
    }
}

pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load (downloading if needed) the named model.
    pub async fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, RepositoryError> {
        let (model, dimension) = resolve_model(model_name).ok_or_else(|| {
            RepositoryError::Query(format!("unsupported fastembed model '{model_name}'"))
        })?;

        let options = InitOptions::new(model)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let embedding = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .map_err(|e| RepositoryError::Query(format!("embedding model init task failed: {e}")))?
            .map_err(|e| RepositoryError::Query(format!("failed to load embedding model: {e}")))?;

        tracing::info!(model = %model_name, dimension, "initialized local embedder");

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| RepositoryError::Query(format!("embedding model lock poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| RepositoryError::Query(format!("failed to generate embeddings: {e}")))
        })
        .await
        .map_err(|e| RepositoryError::Query(format!("embedding task failed: {e}")))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        let (_, dim) = resolve_model("BAAI/bge-small-en-v1.5").unwrap();
        assert_eq!(dim, 384);
        let (_, dim) = resolve_model("bge-base-en-v1.5").unwrap();
        assert_eq!(dim, 768);
    }

    #[test]
    fn test_resolve_unknown_model() {
        assert!(resolve_model("text-embedding-3-small").is_none());
    }
}
