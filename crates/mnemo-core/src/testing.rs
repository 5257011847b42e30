//! In-memory implementations of the port traits for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mnemo_types::config::{MemoryConfig, RetentionPolicy};
use mnemo_types::error::RepositoryError;
use mnemo_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, Usage,
};
use mnemo_types::maintenance::MaintenanceJob;
use mnemo_types::profile::{ProfileAttribute, UserProfile};
use mnemo_types::summary::ConversationSummary;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, SimilarityResult, ThreadStats, TurnId, TurnRole};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::embedder::Embedder;
use crate::memory::index::TurnVectorIndex;
use crate::memory::service::MemoryService;
use crate::memory::similarity::cosine_similarity;
use crate::repository::job::MaintenanceJobRepository;
use crate::repository::profile::ProfileRepository;
use crate::repository::summary::SummaryRepository;
use crate::repository::turn::TurnRepository;

pub const MOCK_DIMENSION: usize = 32;

pub fn thread(id: &str) -> ThreadId {
    ThreadId::new(id).unwrap()
}

pub fn turn(thread_id: &str, id: TurnId, role: TurnRole, content: &str) -> ConversationTurn {
    ConversationTurn {
        id,
        thread_id: thread(thread_id),
        role,
        content: content.to_string(),
        created_at: Utc::now(),
        indexed_at: None,
        embedding_model: None,
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryTurns {
    rows: Arc<Mutex<Vec<ConversationTurn>>>,
    next_id: Arc<Mutex<TurnId>>,
    pub fail_appends: Arc<AtomicBool>,
}

impl InMemoryTurns {
    pub fn all(&self) -> Vec<ConversationTurn> {
        self.rows.lock().unwrap().clone()
    }

    fn of_thread(&self, thread_id: &ThreadId) -> Vec<ConversationTurn> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.thread_id == thread_id)
            .cloned()
            .collect()
    }
}

impl TurnRepository for InMemoryTurns {
    async fn append(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        content: &str,
    ) -> Result<ConversationTurn, RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let turn = ConversationTurn {
            id,
            thread_id: thread_id.clone(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            indexed_at: None,
            embedding_model: None,
        };
        self.rows.lock().unwrap().push(turn.clone());
        Ok(turn)
    }

    async fn get(&self, id: TurnId) -> Result<Option<ConversationTurn>, RepositoryError> {
        Ok(self.rows.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn list(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows: Vec<_> = self
            .of_thread(thread_id)
            .into_iter()
            .filter(|t| after.is_none_or(|a| t.id > a))
            .collect();
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn active_turns(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        Ok(self
            .of_thread(thread_id)
            .into_iter()
            .filter(|t| after.is_none_or(|a| t.id > a))
            .collect())
    }

    async fn unindexed(
        &self,
        thread_id: &ThreadId,
        up_to: TurnId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        Ok(self
            .of_thread(thread_id)
            .into_iter()
            .filter(|t| t.id <= up_to && t.indexed_at.is_none())
            .collect())
    }

    async fn with_role(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        after: Option<TurnId>,
        up_to: TurnId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows: Vec<_> = self
            .of_thread(thread_id)
            .into_iter()
            .filter(|t| t.role == role && t.id <= up_to && after.is_none_or(|a| t.id > a))
            .collect();
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn count_after(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> Result<u64, RepositoryError> {
        Ok(self.active_turns(thread_id, after).await?.len() as u64)
    }

    async fn mark_indexed(
        &self,
        ids: &[TurnId],
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        for row in self.rows.lock().unwrap().iter_mut() {
            if ids.contains(&row.id) {
                row.indexed_at = Some(at);
                row.embedding_model = Some(model.to_string());
            }
        }
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadStats>, RepositoryError> {
        let mut stats: BTreeMap<ThreadId, ThreadStats> = BTreeMap::new();
        for row in self.rows.lock().unwrap().iter() {
            let entry = stats.entry(row.thread_id.clone()).or_insert(ThreadStats {
                thread_id: row.thread_id.clone(),
                turn_count: 0,
                unindexed_count: 0,
                last_turn_at: row.created_at,
            });
            entry.turn_count += 1;
            if row.indexed_at.is_none() {
                entry.unindexed_count += 1;
            }
            entry.last_turn_at = entry.last_turn_at.max(row.created_at);
        }
        let mut stats: Vec<_> = stats.into_values().collect();
        stats.sort_by(|a, b| b.last_turn_at.cmp(&a.last_turn_at));
        Ok(stats)
    }

    async fn prune(
        &self,
        thread_id: &ThreadId,
        through: TurnId,
        policy: RetentionPolicy,
    ) -> Result<u64, RepositoryError> {
        if policy == RetentionPolicy::Archive {
            return Ok(0);
        }
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|t| !(&t.thread_id == thread_id && t.id <= through && t.indexed_at.is_some()));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProfiles {
    profiles: Arc<Mutex<HashMap<ThreadId, UserProfile>>>,
    watermarks: Arc<Mutex<HashMap<ThreadId, TurnId>>>,
}

impl ProfileRepository for InMemoryProfiles {
    async fn get(&self, thread_id: &ThreadId) -> Result<UserProfile, RepositoryError> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_else(|| UserProfile::empty(thread_id.clone())))
    }

    async fn upsert(
        &self,
        thread_id: &ThreadId,
        attributes: &[ProfileAttribute],
    ) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(thread_id.clone())
            .or_insert_with(|| UserProfile::empty(thread_id.clone()));
        for attr in attributes {
            profile.attributes.insert(attr.name.clone(), attr.clone());
        }
        Ok(())
    }

    async fn extracted_through(&self, thread_id: &ThreadId) -> Result<Option<TurnId>, RepositoryError> {
        Ok(self.watermarks.lock().unwrap().get(thread_id).copied())
    }

    async fn mark_extracted(&self, thread_id: &ThreadId, through: TurnId) -> Result<(), RepositoryError> {
        let mut watermarks = self.watermarks.lock().unwrap();
        let mark = watermarks.entry(thread_id.clone()).or_insert(through);
        *mark = (*mark).max(through);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySummaries {
    summaries: Arc<Mutex<HashMap<ThreadId, ConversationSummary>>>,
    /// Number of `save` calls.
    pub saves: Arc<AtomicUsize>,
}

impl SummaryRepository for InMemorySummaries {
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<ConversationSummary>, RepositoryError> {
        Ok(self.summaries.lock().unwrap().get(thread_id).cloned())
    }

    async fn save(&self, summary: &ConversationSummary) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.summaries
            .lock()
            .unwrap()
            .insert(summary.thread_id.clone(), summary.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobs {
    jobs: Arc<Mutex<BTreeMap<Uuid, MaintenanceJob>>>,
}

impl InMemoryJobs {
    pub fn all(&self) -> Vec<MaintenanceJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

impl MaintenanceJobRepository for InMemoryJobs {
    async fn save(&self, job: &MaintenanceJob) -> Result<(), RepositoryError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &MaintenanceJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        self.jobs.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_pending(&self, max_attempts: u32) -> Result<Vec<MaintenanceJob>, RepositoryError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|j| j.attempt_count < max_attempts)
            .collect())
    }

    async fn list(&self) -> Result<Vec<MaintenanceJob>, RepositoryError> {
        Ok(self.all())
    }
}

// ---------------------------------------------------------------------------
// Vector index and embedder
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct InMemoryIndex {
    entries: Arc<Mutex<HashMap<ThreadId, Vec<(SimilarityResult, Vec<f32>)>>>>,
    dimension: usize,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: Arc::default(),
            dimension,
        }
    }

    /// Insert a raw vector directly (bypassing the embedder).
    pub fn insert(&self, turn: &ConversationTurn, vector: Vec<f32>) {
        let mut entries = self.entries.lock().unwrap();
        let rows = entries.entry(turn.thread_id.clone()).or_default();
        rows.retain(|(r, _)| r.turn_id != turn.id);
        rows.push((
            SimilarityResult {
                turn_id: turn.id,
                thread_id: turn.thread_id.clone(),
                content: turn.content.clone(),
                similarity: 0.0,
            },
            vector,
        ));
    }
}

impl TurnVectorIndex for InMemoryIndex {
    async fn upsert(
        &self,
        turn: &ConversationTurn,
        _model: &str,
        vector: &[f32],
    ) -> Result<(), RepositoryError> {
        if vector.len() != self.dimension {
            return Err(RepositoryError::Query("dimension mismatch".to_string()));
        }
        self.insert(turn, vector.to_vec());
        Ok(())
    }

    async fn search(
        &self,
        thread_id: &ThreadId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, RepositoryError> {
        let entries = self.entries.lock().unwrap();
        let Some(rows) = entries.get(thread_id) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<SimilarityResult> = rows
            .iter()
            .map(|(r, v)| SimilarityResult {
                similarity: cosine_similarity(query, v),
                ..r.clone()
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, thread_id: &ThreadId) -> Result<u64, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(thread_id)
            .map_or(0, |rows| rows.len() as u64))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Hashed bag-of-words embedder: identical texts embed identically and
/// texts sharing words score higher than unrelated ones.
#[derive(Clone, Default)]
pub struct MockEmbedder {
    pub fail: Arc<AtomicBool>,
    pub delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
    /// Reject any batch containing a text with this marker.
    pub reject: Option<&'static str>,
    /// Size of every batch passed to `embed`.
    pub batches: Arc<Mutex<Vec<usize>>>,
}

impl MockEmbedder {
    pub fn rejecting(marker: &'static str) -> Self {
        Self {
            reject: Some(marker),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; MOCK_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            v[(hash % MOCK_DIMENSION as u64) as usize] += 1.0;
        }
        v
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().unwrap().push(texts.len());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("embedding service unavailable".to_string()));
        }
        if let Some(marker) = self.reject {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(RepositoryError::Query("input rejected by embedding service".to_string()));
            }
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

type Script = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// LLM provider answering from a closure. Clones share the call counter.
#[derive(Clone)]
pub struct ScriptedLlm {
    script: Arc<Script>,
    calls: Arc<AtomicUsize>,
    capabilities: ProviderCapabilities,
    slow: Option<(CallKind, Duration)>,
}

impl ScriptedLlm {
    pub fn new(
        script: impl Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::default(),
            capabilities: ProviderCapabilities {
                max_context_tokens: 8_192,
                max_output_tokens: 1_024,
            },
            slow: None,
        }
    }

    pub fn with_output_limit(mut self, max_output_tokens: u32) -> Self {
        self.capabilities.max_output_tokens = max_output_tokens;
        self
    }

    /// Delay every call of the given kind.
    pub fn slow(mut self, kind: CallKind, delay: Duration) -> Self {
        self.slow = Some((kind, delay));
        self
    }

    pub fn boxed(&self) -> Arc<BoxLlmProvider> {
        Arc::new(BoxLlmProvider::new(self.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((kind, delay)) = self.slow {
            if call_kind(request) == kind {
                tokio::time::sleep(delay).await;
            }
        }
        let content = (self.script)(request)?;
        Ok(CompletionResponse {
            id: format!("scripted-{}", self.calls()),
            content,
            model: "scripted".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

/// Which background or foreground call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Extract,
    Summarize,
    Respond,
}

pub fn call_kind(request: &CompletionRequest) -> CallKind {
    let system = request.system.as_deref().unwrap_or_default();
    if system.contains("extract durable facts") {
        CallKind::Extract
    } else if system.contains("running summary of a conversation") {
        CallKind::Summarize
    } else {
        CallKind::Respond
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub type TestMemory = MemoryService<InMemoryTurns, InMemoryProfiles, InMemorySummaries, InMemoryIndex>;

/// Handles onto the shared in-memory stores behind a [`TestMemory`].
#[derive(Clone)]
pub struct Stores {
    pub turns: InMemoryTurns,
    pub profiles: InMemoryProfiles,
    pub summaries: InMemorySummaries,
    pub index: InMemoryIndex,
    pub embedder: MockEmbedder,
}

impl Stores {
    pub fn new(embedder: MockEmbedder) -> Self {
        Self {
            turns: InMemoryTurns::default(),
            profiles: InMemoryProfiles::default(),
            summaries: InMemorySummaries::default(),
            index: InMemoryIndex::new(MOCK_DIMENSION),
            embedder,
        }
    }

    pub fn memory(&self, config: MemoryConfig) -> Arc<TestMemory> {
        Arc::new(MemoryService::new(
            self.turns.clone(),
            self.profiles.clone(),
            self.summaries.clone(),
            self.index.clone(),
            Arc::new(BoxEmbedder::new(self.embedder.clone())),
            config,
        ))
    }
}
