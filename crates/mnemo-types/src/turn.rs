//! Conversation turn types.
//!
//! A turn is one recorded message in a thread. Turns are append-only: once
//! written, only their indexing metadata changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::thread::ThreadId;

/// Storage-assigned turn identifier, strictly increasing across the store.
pub type TurnId = i64;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(TurnRole::User),
            "assistant" | "ai" => Ok(TurnRole::Assistant),
            "system" => Ok(TurnRole::System),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// A single recorded conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub thread_id: ThreadId,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// When the turn's embedding was written to the vector index.
    pub indexed_at: Option<DateTime<Utc>>,
    /// Embedding model used for the indexed vector.
    pub embedding_model: Option<String>,
}

impl ConversationTurn {
    pub fn is_indexed(&self) -> bool {
        self.indexed_at.is_some()
    }
}

/// A turn ranked against a query embedding.
///
/// Produced by similarity search and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub turn_id: TurnId,
    pub thread_id: ThreadId,
    pub content: String,
    /// `1 - cosine_distance`.
    pub similarity: f32,
}

/// Aggregate counters for one thread (for listings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStats {
    pub thread_id: ThreadId,
    pub turn_count: u64,
    pub unindexed_count: u64,
    pub last_turn_at: DateTime<Utc>,
}
