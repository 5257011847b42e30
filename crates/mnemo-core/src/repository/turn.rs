//! Turn repository trait definition.
//!
//! Turns are append-only. Apart from indexing metadata the only mutation
//! is pruning of rows that a summary already covers.

use chrono::{DateTime, Utc};

use mnemo_types::config::RetentionPolicy;
use mnemo_types::error::RepositoryError;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, ThreadStats, TurnId, TurnRole};

/// Repository trait for raw conversation history.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in mnemo-infra (e.g., `SqliteTurnRepository`).
pub trait TurnRepository: Send + Sync {
    /// Durably append a turn and return it with its assigned id and timestamp.
    fn append(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        content: &str,
    ) -> impl std::future::Future<Output = Result<ConversationTurn, RepositoryError>> + Send;

    fn get(
        &self,
        id: TurnId,
    ) -> impl std::future::Future<Output = Result<Option<ConversationTurn>, RepositoryError>> + Send;

    /// The newest `limit` turns with `id > after`, returned oldest first.
    fn list(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;

    /// Every turn with `id > after` (all turns when `after` is `None`), oldest first.
    fn active_turns(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;

    /// Turns of the thread with `id <= up_to` that have no embedding yet, oldest first.
    fn unindexed(
        &self,
        thread_id: &ThreadId,
        up_to: TurnId,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;

    /// The newest `limit` turns with the given role and `after < id <= up_to`,
    /// returned oldest first.
    fn with_role(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        after: Option<TurnId>,
        up_to: TurnId,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationTurn>, RepositoryError>> + Send;

    fn count_after(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Record that the given turns now have an embedding in the vector index.
    fn mark_indexed(
        &self,
        ids: &[TurnId],
        model: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// One entry per thread with at least one stored turn, most recently active first.
    fn list_threads(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ThreadStats>, RepositoryError>> + Send;

    /// Apply the retention policy to turns with `id <= through`.
    ///
    /// `Archive` keeps every row. `Delete` removes only rows that are
    /// already indexed. Returns the number of rows removed.
    fn prune(
        &self,
        thread_id: &ThreadId,
        through: TurnId,
        policy: RetentionPolicy,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
