//! OpenAI-compatible embedding client.
//!
//! `POST {base_url}/embeddings` with `{model, input: [..]}`; works against
//! OpenAI, Ollama (`/v1`), vLLM and similar servers.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use mnemo_core::memory::embedder::Embedder;
use mnemo_types::error::RepositoryError;

pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RepositoryError::Query(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimension,
        })
    }
}

/// Order vectors by `index` and check count and width.
fn parse_embeddings(
    body: EmbeddingResponse,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, RepositoryError> {
    let mut data = body.data;
    if data.len() != expected {
        return Err(RepositoryError::Query(format!(
            "embedding endpoint returned {} vectors for {expected} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimension {
                Ok(d.embedding)
            } else {
                Err(RepositoryError::Query(format!(
                    "embedding has {} dimensions, expected {dimension}",
                    d.embedding.len()
                )))
            }
        })
        .collect()
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RepositoryError::Query(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RepositoryError::Query(format!(
                "embedding endpoint returned {status}: {text}"
            )));
        }

        let body: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| RepositoryError::Query(format!("invalid embedding response: {e}")))?;
        parse_embeddings(body, texts.len(), self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_reorders_by_index() {
        let body = response(
            r#"{"object":"list","data":[
                {"object":"embedding","index":1,"embedding":[0.0,1.0]},
                {"object":"embedding","index":0,"embedding":[1.0,0.0]}
            ],"model":"m"}"#,
        );
        let vectors = parse_embeddings(body, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        let body = response(r#"{"data":[{"index":0,"embedding":[1.0,0.0,0.0]}]}"#);
        assert!(parse_embeddings(body, 1, 2).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_vectors() {
        let body = response(r#"{"data":[]}"#);
        assert!(parse_embeddings(body, 1, 2).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let embedder = HttpEmbedder::new(
            "http://localhost:11434/v1/",
            None,
            "nomic-embed-text",
            768,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434/v1");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dimension(), 768);
    }
}
