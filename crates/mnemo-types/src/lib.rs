//! Shared domain types for mnemo.
//!
//! This crate contains the types used across the mnemo workspace: threads,
//! turns, profiles, summaries, maintenance jobs, configuration, LLM
//! request/response shapes, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod maintenance;
pub mod profile;
pub mod summary;
pub mod thread;
pub mod turn;
