//! Infrastructure layer for mnemo.
//!
//! Contains implementations of the ports defined in `mnemo-core`: SQLite
//! repositories for turns, profiles, summaries and maintenance jobs, the
//! LanceDB turn index with its embedders, the OpenAI-compatible LLM
//! provider, and config loading.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod vector;
