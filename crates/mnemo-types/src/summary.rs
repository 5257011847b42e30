use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thread::ThreadId;
use crate::turn::TurnId;

/// Condensed running summary of a thread.
///
/// `covers_through` is the retention boundary: every turn with an id at or
/// below it has been folded into `content` and is no longer part of the
/// active context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: ThreadId,
    pub content: String,
    pub covers_through: TurnId,
    /// Total number of raw turns folded into this summary so far.
    pub summarized_turns: u64,
    pub updated_at: DateTime<Utc>,
}
