//! The per-job maintenance pipeline.
//!
//! Stages run in order: index every pending turn, extract profile
//! attributes from every user turn since the last extraction, then
//! summarize and prune if the thread is still due. Embedding, extraction and summarization failures
//! are logged and skipped; only turn/profile/summary storage failures fail
//! the job so the queue can retry it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use mnemo_types::error::MemoryError;
use mnemo_types::maintenance::{MaintenanceJob, MaintenanceReport};

use super::JobRunner;
use crate::memory::extractor::EntityExtractor;
use crate::memory::index::TurnVectorIndex;
use crate::memory::service::MemoryService;
use crate::memory::summarizer::Summarizer;
use crate::repository::profile::ProfileRepository;
use crate::repository::summary::SummaryRepository;
use crate::repository::turn::TurnRepository;

pub struct MaintenancePipeline<T, P, S, V>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
{
    memory: Arc<MemoryService<T, P, S, V>>,
    extractor: EntityExtractor,
    summarizer: Summarizer,
}

impl<T, P, S, V> MaintenancePipeline<T, P, S, V>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
{
    pub fn new(
        memory: Arc<MemoryService<T, P, S, V>>,
        extractor: EntityExtractor,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            memory,
            extractor,
            summarizer,
        }
    }

    /// Run every stage for `job`.
    ///
    /// Safe to run more than once for the same job: indexing only touches
    /// unindexed turns, profile merges are idempotent and the summary
    /// trigger is re-evaluated against the current state.
    #[tracing::instrument(
        name = "maintenance_job",
        skip(self, job),
        fields(job_id = %job.id, thread_id = %job.thread_id, turn_id = job.turn_id)
    )]
    pub async fn execute(&self, job: &MaintenanceJob) -> Result<MaintenanceReport, MemoryError> {
        let thread_id = &job.thread_id;
        let mut report = MaintenanceReport::default();

        let indexed = self.memory.index_pending(thread_id, job.turn_id).await?;
        report.indexed_turns = indexed.indexed;
        report.failed_embeddings = indexed.failed;

        let backlog = self.memory.extraction_backlog(thread_id, job.turn_id).await?;
        let mut extracted_through = None;
        for turn in &backlog {
            match self.extractor.extract(&turn.content).await {
                Ok(attributes) => {
                    report.profile_changes += self
                        .memory
                        .merge_profile(thread_id, &attributes, Some(turn.id))
                        .await?;
                    extracted_through = Some(turn.id);
                }
                Err(e) => {
                    // Later turns wait so that facts are merged in turn order.
                    warn!(turn_id = turn.id, error = %e, "entity extraction failed; retrying with the next job");
                    break;
                }
            }
        }
        if let Some(through) = extracted_through {
            self.memory.mark_extracted(thread_id, through).await?;
        }

        if job.summarize && self.memory.summary_due(thread_id).await? {
            if let Some(outcome) = self.memory.summarize(thread_id, &self.summarizer).await? {
                report.summarized = true;
                report.pruned_turns = outcome.pruned;
            }
        } else if job.summarize {
            debug!("summary no longer due; skipping");
        }

        debug!(?report, "maintenance job finished");
        Ok(report)
    }
}

impl<T, P, S, V> JobRunner for MaintenancePipeline<T, P, S, V>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
{
    fn run<'a>(
        &'a self,
        job: &'a MaintenanceJob,
    ) -> Pin<Box<dyn Future<Output = Result<MaintenanceReport, MemoryError>> + Send + 'a>> {
        Box::pin(self.execute(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, MockEmbedder, ScriptedLlm, Stores, TestMemory, call_kind, thread};
    use mnemo_types::config::MemoryConfig;
    use mnemo_types::llm::LlmError;
    use mnemo_types::thread::ThreadId;
    use mnemo_types::turn::TurnRole;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pipeline(memory: Arc<TestMemory>, llm: &ScriptedLlm) -> MaintenancePipeline<
        crate::testing::InMemoryTurns,
        crate::testing::InMemoryProfiles,
        crate::testing::InMemorySummaries,
        crate::testing::InMemoryIndex,
    > {
        MaintenancePipeline::new(
            memory,
            EntityExtractor::new(llm.boxed(), ""),
            Summarizer::new(llm.boxed(), ""),
        )
    }

    fn background_llm() -> ScriptedLlm {
        ScriptedLlm::new(|request| match call_kind(request) {
            CallKind::Extract if request.messages[0].content.contains("New York") => {
                Ok(r#"{"location": "New York"}"#.to_string())
            }
            CallKind::Extract => Ok("{}".to_string()),
            CallKind::Summarize => Ok("The user lives in New York.".to_string()),
            CallKind::Respond => Ok("unused".to_string()),
        })
    }

    async fn exchange(memory: &TestMemory, t: &ThreadId, user: &str) -> i64 {
        memory.record_turn(t, TurnRole::User, user).await.unwrap();
        memory
            .record_turn(t, TurnRole::Assistant, "noted")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_pipeline_indexes_and_extracts() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let llm = background_llm();
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        let last = exchange(&memory, &t, "I live in New York").await;
        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), last, false))
            .await
            .unwrap();

        assert_eq!(report.indexed_turns, 2);
        assert_eq!(report.profile_changes, 1);
        assert!(!report.summarized);
        let profile = memory.profile(&t).await.unwrap();
        assert_eq!(profile.get("location"), Some(&json!("New York")));
        assert_eq!(profile.attributes["location"].source_turn_id, Some(last - 1));
    }

    #[tokio::test]
    async fn test_rerunning_a_job_is_idempotent() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let llm = background_llm();
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        let last = exchange(&memory, &t, "I live in New York").await;
        let job = MaintenanceJob::new(t.clone(), last, false);
        pipeline.execute(&job).await.unwrap();
        let profile = memory.profile(&t).await.unwrap();

        let report = pipeline.execute(&job).await.unwrap();
        assert_eq!(report.indexed_turns, 0);
        assert_eq!(report.profile_changes, 0);
        assert_eq!(memory.profile(&t).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_summarizes_when_due() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let llm = background_llm();
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        exchange(&memory, &t, "hello").await;
        exchange(&memory, &t, "I live in New York").await;
        let last = exchange(&memory, &t, "what's the weather").await;
        assert!(memory.summary_due(&t).await.unwrap());

        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), last, true))
            .await
            .unwrap();
        assert!(report.summarized);
        let summary = memory.summary(&t).await.unwrap().unwrap();
        assert_eq!(summary.content, "The user lives in New York.");

        // A duplicate job for the same turn finds nothing left to summarize.
        let again = pipeline
            .execute(&MaintenanceJob::new(t.clone(), last, true))
            .await
            .unwrap();
        assert!(!again.summarized);
    }

    #[tokio::test]
    async fn test_background_llm_failures_are_not_fatal() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let llm = ScriptedLlm::new(|_| Err(LlmError::RateLimited { retry_after_ms: None }));
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        let mut last = 0;
        for _ in 0..3 {
            last = exchange(&memory, &t, "I live in New York").await;
        }
        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), last, true))
            .await
            .unwrap();

        assert_eq!(report.indexed_turns, 6);
        assert_eq!(report.profile_changes, 0);
        assert!(!report.summarized);
        assert!(memory.summary(&t).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extracts_user_turns_left_without_a_job() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let llm = background_llm();
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        // The reply to this turn failed, so no job was scheduled for it.
        let orphan = memory
            .record_turn(&t, TurnRole::User, "I live in New York")
            .await
            .unwrap();
        let last = exchange(&memory, &t, "what's the weather").await;

        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), last, false))
            .await
            .unwrap();

        assert_eq!(report.profile_changes, 1);
        let profile = memory.profile(&t).await.unwrap();
        assert_eq!(profile.get("location"), Some(&json!("New York")));
        assert_eq!(profile.attributes["location"].source_turn_id, Some(orphan.id));
        // Both user turns went through extraction.
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_extraction_is_retried_by_the_next_job() {
        let stores = Stores::new(MockEmbedder::default());
        let memory = stores.memory(MemoryConfig::default());
        let down = Arc::new(AtomicBool::new(true));
        let llm = {
            let down = Arc::clone(&down);
            ScriptedLlm::new(move |request| match call_kind(request) {
                CallKind::Extract if down.load(Ordering::SeqCst) => {
                    Err(LlmError::RateLimited { retry_after_ms: None })
                }
                CallKind::Extract if request.messages[0].content.contains("Madrid") => {
                    Ok(r#"{"location": "Madrid"}"#.to_string())
                }
                CallKind::Extract if request.messages[0].content.contains("New York") => {
                    Ok(r#"{"location": "New York"}"#.to_string())
                }
                _ => Ok("{}".to_string()),
            })
        };
        let pipeline = pipeline(Arc::clone(&memory), &llm);
        let t = thread("t1");

        let first = exchange(&memory, &t, "I live in New York").await;
        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), first, false))
            .await
            .unwrap();
        assert_eq!(report.profile_changes, 0);

        down.store(false, Ordering::SeqCst);
        let second = exchange(&memory, &t, "I moved to Madrid").await;
        let report = pipeline
            .execute(&MaintenanceJob::new(t.clone(), second, false))
            .await
            .unwrap();

        // Both turns are extracted in order, so the newer fact wins.
        assert_eq!(report.profile_changes, 2);
        let profile = memory.profile(&t).await.unwrap();
        assert_eq!(profile.get("location"), Some(&json!("Madrid")));
        assert_eq!(profile.attributes["location"].source_turn_id, Some(second - 1));

        let again = pipeline
            .execute(&MaintenanceJob::new(t.clone(), second, false))
            .await
            .unwrap();
        assert_eq!(again.profile_changes, 0);
    }
}
