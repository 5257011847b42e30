//! Per-thread vector index over turn embeddings.
//!
//! Implementations (LanceDB) live in mnemo-infra. Every thread has its own
//! isolated index, so a search can never see another thread's turns.

use mnemo_types::error::RepositoryError;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, SimilarityResult};

pub trait TurnVectorIndex: Send + Sync {
    /// Store (or replace) the embedding of a turn in its thread's index.
    ///
    /// Re-indexing the same turn id replaces the previous entry.
    fn upsert(
        &self,
        turn: &ConversationTurn,
        model: &str,
        vector: &[f32],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Nearest `limit` entries of the thread by cosine distance.
    ///
    /// Similarities are `1 - distance` and are *not* filtered by any
    /// threshold; see [`crate::memory::similarity::rank_matches`]. A thread
    /// without an index yields an empty list.
    fn search(
        &self,
        thread_id: &ThreadId,
        query: &[f32],
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<SimilarityResult>, RepositoryError>> + Send;

    /// Number of indexed turns for the thread.
    fn count(
        &self,
        thread_id: &ThreadId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Vector length every entry must have.
    fn dimension(&self) -> usize;
}
