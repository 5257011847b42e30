//! Post-turn maintenance job types.
//!
//! A maintenance job is created after a user-visible response has been
//! produced. It is persisted before dispatch so that a crash between
//! enqueue and completion re-runs it on the next start (at-least-once).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::thread::ThreadId;
use crate::turn::TurnId;

/// A pending maintenance pass for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceJob {
    pub id: Uuid,
    pub thread_id: ThreadId,
    /// Newest turn this pass covers. Indexing sweeps every unindexed turn
    /// of the thread up to and including it.
    pub turn_id: TurnId,
    /// Whether the summary threshold was reached when the job was enqueued.
    pub summarize: bool,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceJob {
    pub fn new(thread_id: ThreadId, turn_id: TurnId, summarize: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            thread_id,
            turn_id,
            summarize,
            attempt_count: 0,
            last_attempt_at: None,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

/// What one maintenance pass accomplished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub indexed_turns: usize,
    pub failed_embeddings: usize,
    pub profile_changes: usize,
    pub summarized: bool,
    pub pruned_turns: u64,
}
