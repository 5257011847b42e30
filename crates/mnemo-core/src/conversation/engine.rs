//! Conversation engine: respond first, maintain later.
//!
//! `respond` records the user turn, builds the active context, calls the
//! chat model once, records the reply and enqueues a maintenance job. The
//! job (indexing, entity extraction, summarization) runs on the thread's
//! background worker after `respond` has returned.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use mnemo_types::config::LlmConfig;
use mnemo_types::error::MemoryError;
use mnemo_types::llm::LlmError;
use mnemo_types::maintenance::{MaintenanceJob, MaintenanceReport};
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, SimilarityResult, TurnId, TurnRole};

use super::context::ActiveContext;
use crate::llm::box_provider::BoxLlmProvider;
use crate::maintenance::queue::MaintenanceQueue;
use crate::memory::index::TurnVectorIndex;
use crate::memory::service::MemoryService;
use crate::repository::job::MaintenanceJobRepository;
use crate::repository::profile::ProfileRepository;
use crate::repository::summary::SummaryRepository;
use crate::repository::turn::TurnRepository;

/// Errors that reach the caller of the response path.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("response generation failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result of one `respond` call.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub thread_id: ThreadId,
    pub user_turn: ConversationTurn,
    pub assistant_turn: ConversationTurn,
    pub content: String,
    pub recalled: Vec<SimilarityResult>,
    /// `None` when the job could not be persisted; the next job's indexing
    /// sweep still picks up both turns.
    pub maintenance_job: Option<Uuid>,
}

/// A turn recorded outside the respond path.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedTurn {
    pub turn: ConversationTurn,
    pub maintenance_job: Option<Uuid>,
}

pub struct ConversationEngine<T, P, S, V, J>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
    J: MaintenanceJobRepository + 'static,
{
    memory: Arc<MemoryService<T, P, S, V>>,
    provider: Arc<BoxLlmProvider>,
    queue: MaintenanceQueue<J>,
    llm: LlmConfig,
}

impl<T, P, S, V, J> ConversationEngine<T, P, S, V, J>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
    J: MaintenanceJobRepository + 'static,
{
    pub fn new(
        memory: Arc<MemoryService<T, P, S, V>>,
        provider: Arc<BoxLlmProvider>,
        queue: MaintenanceQueue<J>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            memory,
            provider,
            queue,
            llm,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryService<T, P, S, V>> {
        &self.memory
    }

    pub fn queue(&self) -> &MaintenanceQueue<J> {
        &self.queue
    }

    /// Answer `user_text` in `thread_id`.
    ///
    /// Only turn recording and the chat call can fail this; recall degrades
    /// to nothing and maintenance problems are logged.
    #[tracing::instrument(name = "respond", skip(self, user_text), fields(thread_id = %thread_id))]
    pub async fn respond(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
    ) -> Result<Reply, ConversationError> {
        let user_turn = self
            .memory
            .record_turn(thread_id, TurnRole::User, user_text)
            .await?;

        let context = self.build_context(thread_id, user_text).await?;
        let request = context.to_request(
            &self.llm.model,
            self.provider.output_budget(self.llm.max_tokens),
            self.llm.temperature,
        );
        let response = self.provider.complete(&request).await?;
        let content = response.content.trim().to_string();

        let assistant_turn = self
            .memory
            .record_turn(thread_id, TurnRole::Assistant, &content)
            .await?;

        let maintenance_job = self.schedule(thread_id, assistant_turn.id).await;
        info!(
            user_turn = user_turn.id,
            assistant_turn = assistant_turn.id,
            recalled = context.recalled.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "responded"
        );

        Ok(Reply {
            thread_id: thread_id.clone(),
            user_turn,
            assistant_turn,
            content,
            recalled: context.recalled,
            maintenance_job,
        })
    }

    /// Record a turn without generating a response, then schedule maintenance.
    pub async fn record(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        content: &str,
    ) -> Result<RecordedTurn, MemoryError> {
        let turn = self.memory.record_turn(thread_id, role, content).await?;
        let maintenance_job = self.schedule(thread_id, turn.id).await;
        Ok(RecordedTurn {
            turn,
            maintenance_job,
        })
    }

    /// Run a maintenance pass for the whole thread and wait for it.
    pub async fn maintain(&self, thread_id: &ThreadId) -> Result<MaintenanceReport, MemoryError> {
        let latest = self
            .memory
            .history(thread_id, true, 1)
            .await?
            .pop()
            .ok_or_else(|| MemoryError::NotFound(format!("thread '{thread_id}'")))?;
        let summarize = self.memory.summary_due(thread_id).await?;
        self.queue
            .run_and_wait(MaintenanceJob::new(thread_id.clone(), latest.id, summarize))
            .await
    }

    /// Active context for `query` without recording anything.
    pub async fn build_context(
        &self,
        thread_id: &ThreadId,
        query: &str,
    ) -> Result<ActiveContext, MemoryError> {
        let window = self.memory.active_window(thread_id).await?;
        let profile = self.memory.profile(thread_id).await?;
        let recalled = self.memory.recall(thread_id, query).await;
        Ok(ActiveContext {
            summary: window.summary,
            turns: window.turns,
            profile,
            recalled,
        })
    }

    async fn schedule(&self, thread_id: &ThreadId, turn_id: TurnId) -> Option<Uuid> {
        let summarize = match self.memory.summary_due(thread_id).await {
            Ok(due) => due,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "could not evaluate summary trigger");
                false
            }
        };
        match self
            .queue
            .enqueue(MaintenanceJob::new(thread_id.clone(), turn_id, summarize))
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(thread_id = %thread_id, turn_id, error = %e, "failed to enqueue maintenance");
                None
            }
        }
    }
}
