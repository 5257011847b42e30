//! Vector database infrastructure for turn embeddings.
//!
//! Provides LanceDB vector store management, the per-thread turn index and
//! the two embedding backends (local fastembed, OpenAI-compatible HTTP).

pub mod embedder;
pub mod http_embedder;
pub mod lance;
pub mod schema;
pub mod turn_index;
