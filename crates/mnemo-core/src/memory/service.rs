//! Memory service.
//!
//! `MemoryService` is the single entry point over the four memory stores
//! (turn history, profile, summary, vector index) plus the embedder. The
//! response path uses the cheap read operations; the background pipeline
//! uses the indexing, merge and summarize operations.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use mnemo_types::config::MemoryConfig;
use mnemo_types::error::MemoryError;
use mnemo_types::profile::{ProfileAttributes, UserProfile};
use mnemo_types::summary::ConversationSummary;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, SimilarityResult, ThreadStats, TurnId, TurnRole};

use super::box_embedder::BoxEmbedder;
use super::index::TurnVectorIndex;
use super::similarity::rank_matches;
use super::summarizer::{Summarizer, SummaryPolicy};
use crate::repository::profile::ProfileRepository;
use crate::repository::summary::SummaryRepository;
use crate::repository::turn::TurnRepository;

/// Maximum number of turns sent to the embedder in one call.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Most user turns extracted in one maintenance pass. Older unextracted
/// turns beyond this are skipped.
pub const EXTRACTION_BACKLOG: u32 = 8;

/// Outcome of one indexing sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub indexed: usize,
    pub failed: usize,
}

/// Outcome of a committed summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub summary: ConversationSummary,
    pub pruned: u64,
}

/// The summary plus every turn above its boundary.
#[derive(Debug, Clone, Default)]
pub struct ActiveWindow {
    pub summary: Option<ConversationSummary>,
    pub turns: Vec<ConversationTurn>,
}

/// Service over the memory stores of every thread.
///
/// Generic over repository and index traits so that mnemo-core never
/// depends on mnemo-infra.
pub struct MemoryService<T, P, S, V>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
{
    turns: T,
    profiles: P,
    summaries: S,
    index: V,
    embedder: Arc<BoxEmbedder>,
    config: MemoryConfig,
}

impl<T, P, S, V> MemoryService<T, P, S, V>
where
    T: TurnRepository,
    P: ProfileRepository,
    S: SummaryRepository,
    V: TurnVectorIndex,
{
    pub fn new(
        turns: T,
        profiles: P,
        summaries: S,
        index: V,
        embedder: Arc<BoxEmbedder>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            turns,
            profiles,
            summaries,
            index,
            embedder,
            config,
        }
    }

    pub fn policy(&self) -> SummaryPolicy {
        SummaryPolicy::from_config(&self.config)
    }

    pub fn turns(&self) -> &T {
        &self.turns
    }

    pub fn embedder(&self) -> &BoxEmbedder {
        &self.embedder
    }

    // -----------------------------------------------------------------------
    // Turn recorder
    // -----------------------------------------------------------------------

    /// Durably append a turn. Failures here always surface to the caller.
    pub async fn record_turn(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        content: &str,
    ) -> Result<ConversationTurn, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }
        let turn = self.turns.append(thread_id, role, content).await?;
        debug!(thread_id = %thread_id, turn_id = turn.id, %role, "recorded turn");
        Ok(turn)
    }

    /// Recent history of a thread, oldest first.
    ///
    /// Without `include_archived` only turns above the summary boundary are
    /// listed.
    pub async fn history(
        &self,
        thread_id: &ThreadId,
        include_archived: bool,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        let after = if include_archived {
            None
        } else {
            self.boundary(thread_id).await?
        };
        Ok(self.turns.list(thread_id, after, limit).await?)
    }

    pub async fn threads(&self) -> Result<Vec<ThreadStats>, MemoryError> {
        Ok(self.turns.list_threads().await?)
    }

    /// Summary plus active turns: what the response path feeds the model.
    pub async fn active_window(&self, thread_id: &ThreadId) -> Result<ActiveWindow, MemoryError> {
        let summary = self.summaries.get(thread_id).await?;
        let after = summary.as_ref().map(|s| s.covers_through);
        let turns = self.turns.active_turns(thread_id, after).await?;
        Ok(ActiveWindow { summary, turns })
    }

    /// Whether the thread's active window is due for summarization.
    pub async fn summary_due(&self, thread_id: &ThreadId) -> Result<bool, MemoryError> {
        let window = self.active_window(thread_id).await?;
        Ok(self.policy().is_due(&window.turns))
    }

    async fn boundary(&self, thread_id: &ThreadId) -> Result<Option<TurnId>, MemoryError> {
        Ok(self
            .summaries
            .get(thread_id)
            .await?
            .map(|s| s.covers_through))
    }

    // -----------------------------------------------------------------------
    // Profile and summary reads
    // -----------------------------------------------------------------------

    pub async fn profile(&self, thread_id: &ThreadId) -> Result<UserProfile, MemoryError> {
        Ok(self.profiles.get(thread_id).await?)
    }

    pub async fn summary(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ConversationSummary>, MemoryError> {
        Ok(self.summaries.get(thread_id).await?)
    }

    // -----------------------------------------------------------------------
    // Similarity search
    // -----------------------------------------------------------------------

    /// Top `k` turns of the thread with similarity above the threshold.
    pub async fn search(
        &self,
        thread_id: &ThreadId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityResult>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let expected = self.index.dimension();
        if query.len() != expected {
            return Err(MemoryError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
        let candidates = self
            .index
            .search(thread_id, query, k)
            .await
            .map_err(|e| MemoryError::Index(e.to_string()))?;
        Ok(rank_matches(
            candidates,
            thread_id,
            self.config.similarity_threshold,
            k,
        ))
    }

    /// Embed `text` and search the thread with it.
    pub async fn search_text(
        &self,
        thread_id: &ThreadId,
        text: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed_one(text)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        self.search(thread_id, &query, k).await
    }

    /// Recall for the response path: degrades to nothing on any failure.
    pub async fn recall(&self, thread_id: &ThreadId, text: &str) -> Vec<SimilarityResult> {
        match self
            .search_text(thread_id, text, self.config.recall_limit)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "recall failed; continuing without similar turns");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Background operations
    // -----------------------------------------------------------------------

    /// Embed and index every unindexed turn of the thread up to `up_to`.
    ///
    /// Turns are embedded in batches of at most [`EMBED_BATCH_SIZE`]. When
    /// a batch is rejected its turns are retried one at a time, so a single
    /// unembeddable turn stays unindexed without holding back the others.
    /// Only failures of the turn store are returned as errors.
    pub async fn index_pending(
        &self,
        thread_id: &ThreadId,
        up_to: TurnId,
    ) -> Result<IndexOutcome, MemoryError> {
        let pending = self.turns.unindexed(thread_id, up_to).await?;
        if pending.is_empty() {
            return Ok(IndexOutcome::default());
        }

        let model = self.embedder.model_name().to_string();
        let expected = self.index.dimension();
        let mut indexed = Vec::with_capacity(pending.len());
        let mut failed = 0;
        for chunk in pending.chunks(EMBED_BATCH_SIZE) {
            for (turn, vector) in chunk.iter().zip(self.embed_chunk(thread_id, chunk).await) {
                let Some(vector) = vector else {
                    failed += 1;
                    continue;
                };
                if vector.len() != expected {
                    let err = MemoryError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    };
                    warn!(turn_id = turn.id, error = %err, "skipping turn");
                    failed += 1;
                    continue;
                }
                match self.index.upsert(turn, &model, &vector).await {
                    Ok(()) => indexed.push(turn.id),
                    Err(e) => {
                        warn!(turn_id = turn.id, error = %e, "vector index write failed; turn stays unindexed");
                        failed += 1;
                    }
                }
            }
        }

        if !indexed.is_empty() {
            self.turns.mark_indexed(&indexed, &model, Utc::now()).await?;
        }
        debug!(thread_id = %thread_id, indexed = indexed.len(), failed, "index sweep finished");
        Ok(IndexOutcome {
            indexed: indexed.len(),
            failed,
        })
    }

    /// One vector per turn of `chunk`, `None` where embedding failed.
    async fn embed_chunk(
        &self,
        thread_id: &ThreadId,
        chunk: &[ConversationTurn],
    ) -> Vec<Option<Vec<f32>>> {
        let texts: Vec<String> = chunk.iter().map(|t| t.content.clone()).collect();
        match self.embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == chunk.len() => {
                return vectors.into_iter().map(Some).collect();
            }
            Ok(vectors) => warn!(
                thread_id = %thread_id,
                expected = chunk.len(),
                actual = vectors.len(),
                "embedder returned wrong number of vectors"
            ),
            Err(e) => warn!(thread_id = %thread_id, error = %e, count = chunk.len(), "batch embedding failed"),
        }
        if chunk.len() == 1 {
            return vec![None];
        }

        debug!(thread_id = %thread_id, count = chunk.len(), "embedding turns one at a time");
        let mut vectors = Vec::with_capacity(chunk.len());
        for turn in chunk {
            let vector = match self.embedder.embed_one(&turn.content).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(turn_id = turn.id, error = %e, "embedding failed; turn stays unindexed");
                    None
                }
            };
            vectors.push(vector);
        }
        vectors
    }

    /// Merge extracted attributes into the thread's profile (last write wins).
    ///
    /// Returns the number of attributes that changed; unchanged values are
    /// not rewritten.
    pub async fn merge_profile(
        &self,
        thread_id: &ThreadId,
        extracted: &ProfileAttributes,
        source_turn_id: Option<TurnId>,
    ) -> Result<usize, MemoryError> {
        if extracted.is_empty() {
            return Ok(0);
        }
        let mut profile = self.profiles.get(thread_id).await?;
        let before = profile.clone();
        let changed = profile.merge(extracted, source_turn_id, Utc::now());
        if changed == 0 {
            return Ok(0);
        }

        let updated: Vec<_> = profile
            .attributes
            .values()
            .filter(|attr| before.attributes.get(&attr.name) != Some(*attr))
            .cloned()
            .collect();
        self.profiles.upsert(thread_id, &updated).await?;
        info!(thread_id = %thread_id, changed, "profile updated");
        Ok(changed)
    }

    /// User turns with `id <= up_to` that have not been through entity
    /// extraction yet, oldest first.
    pub async fn extraction_backlog(
        &self,
        thread_id: &ThreadId,
        up_to: TurnId,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        let after = self.profiles.extracted_through(thread_id).await?;
        if after.is_some_and(|through| through >= up_to) {
            return Ok(Vec::new());
        }
        let turns = self
            .turns
            .with_role(thread_id, TurnRole::User, after, up_to, EXTRACTION_BACKLOG)
            .await?;
        Ok(turns)
    }

    pub async fn mark_extracted(&self, thread_id: &ThreadId, through: TurnId) -> Result<(), MemoryError> {
        self.profiles.mark_extracted(thread_id, through).await?;
        Ok(())
    }

    /// Fold the older part of the active window into the summary, then prune.
    ///
    /// The new summary is saved before the retention policy runs; a
    /// summarizer failure leaves everything untouched and returns `None`.
    pub async fn summarize(
        &self,
        thread_id: &ThreadId,
        summarizer: &Summarizer,
    ) -> Result<Option<SummaryOutcome>, MemoryError> {
        let window = self.active_window(thread_id).await?;
        let policy = self.policy();
        let (to_summarize, _kept) = policy.split(&window.turns);
        let Some(last) = to_summarize.last() else {
            return Ok(None);
        };

        let previous = window.summary.as_ref().map(|s| s.content.as_str());
        let content = match summarizer.summarize(previous, to_summarize).await {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => {
                warn!(thread_id = %thread_id, "summarizer returned empty text; nothing pruned");
                return Ok(None);
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "summarization failed; nothing pruned");
                return Ok(None);
            }
        };

        let summary = ConversationSummary {
            thread_id: thread_id.clone(),
            content,
            covers_through: last.id,
            summarized_turns: window.summary.as_ref().map_or(0, |s| s.summarized_turns)
                + to_summarize.len() as u64,
            updated_at: Utc::now(),
        };
        self.summaries.save(&summary).await?;
        info!(
            thread_id = %thread_id,
            covers_through = summary.covers_through,
            folded = to_summarize.len(),
            "summary committed"
        );

        let pruned = self
            .turns
            .prune(thread_id, summary.covers_through, self.config.retention)
            .await?;
        if pruned > 0 {
            info!(thread_id = %thread_id, pruned, policy = %self.config.retention, "turns pruned");
        }
        Ok(Some(SummaryOutcome { summary, pruned }))
    }

    pub async fn indexed_count(&self, thread_id: &ThreadId) -> Result<u64, MemoryError> {
        self.index
            .count(thread_id)
            .await
            .map_err(|e| MemoryError::Index(e.to_string()))
    }
}
