//! Memory services and port trait definitions for mnemo.
//!
//! This crate holds the "ports" (repository, index, embedder and LLM
//! traits) that the infrastructure layer implements, plus everything that
//! runs on top of them: similarity ranking, entity extraction,
//! summarization, the background maintenance queue and the conversation
//! engine. It depends only on `mnemo-types`, never on `mnemo-infra` or any
//! database/IO crate.

pub mod conversation;
pub mod llm;
pub mod maintenance;
pub mod memory;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;
