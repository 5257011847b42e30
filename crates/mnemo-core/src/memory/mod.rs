//! Long-term memory for conversation threads.
//!
//! Port traits for the embedder and the per-thread vector index, the
//! LLM-backed entity extractor and summarizer, similarity ranking, and the
//! `MemoryService` that ties the stores together.

pub mod box_embedder;
pub mod embedder;
pub mod extractor;
pub mod index;
pub mod service;
pub mod similarity;
pub mod summarizer;
