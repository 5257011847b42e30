//! SQLite turn repository implementation.
//!
//! Implements `TurnRepository` from `mnemo-core`. Turns are written through the
//! single-connection writer pool, so `AUTOINCREMENT` ids follow commit order.

use chrono::{DateTime, Utc};
use sqlx::Row;

use mnemo_core::repository::turn::TurnRepository;
use mnemo_types::config::RetentionPolicy;
use mnemo_types::error::RepositoryError;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, ThreadStats, TurnId, TurnRole};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `TurnRepository`.
pub struct SqliteTurnRepository {
    pool: DatabasePool,
}

impl SqliteTurnRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct TurnRow {
    id: i64,
    thread_id: String,
    role: String,
    content: String,
    created_at: String,
    indexed_at: Option<String>,
    embedding_model: Option<String>,
}

impl TurnRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            indexed_at: row.try_get("indexed_at")?,
            embedding_model: row.try_get("embedding_model")?,
        })
    }

    fn into_turn(self) -> Result<ConversationTurn, RepositoryError> {
        let thread_id = ThreadId::new(self.thread_id)
            .map_err(|e| RepositoryError::Query(format!("invalid thread_id: {e}")))?;
        let role: TurnRole = self.role.parse().map_err(RepositoryError::Query)?;
        let indexed_at = self.indexed_at.as_deref().map(parse_datetime).transpose()?;

        Ok(ConversationTurn {
            id: self.id,
            thread_id,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            indexed_at,
            embedding_model: self.embedding_model,
        })
    }
}

fn map_turns(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ConversationTurn>, RepositoryError> {
    let mut turns = Vec::with_capacity(rows.len());
    for row in rows {
        let turn_row = TurnRow::from_row(row).map_err(query_error)?;
        turns.push(turn_row.into_turn()?);
    }
    Ok(turns)
}

const TURN_COLUMNS: &str = "id, thread_id, role, content, created_at, indexed_at, embedding_model";

// ---------------------------------------------------------------------------
// TurnRepository implementation
// ---------------------------------------------------------------------------

impl TurnRepository for SqliteTurnRepository {
    async fn append(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        content: &str,
    ) -> Result<ConversationTurn, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversation_turns (thread_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(thread_id.as_str())
        .bind(role.to_string())
        .bind(content)
        .bind(format_datetime(&created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(ConversationTurn {
            id: result.last_insert_rowid(),
            thread_id: thread_id.clone(),
            role,
            content: content.to_string(),
            // Round-trip through the stored format so reads compare equal.
            created_at: parse_datetime(&format_datetime(&created_at))?,
            indexed_at: None,
            embedding_model: None,
        })
    }

    async fn get(&self, id: TurnId) -> Result<Option<ConversationTurn>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let turn_row = TurnRow::from_row(&row).map_err(query_error)?;
                Ok(Some(turn_row.into_turn()?))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM (
                SELECT {TURN_COLUMNS} FROM conversation_turns
                WHERE thread_id = ? AND id > ?
                ORDER BY id DESC LIMIT ?
             ) ORDER BY id ASC"
        ))
        .bind(thread_id.as_str())
        .bind(after.unwrap_or(0))
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_turns(&rows)
    }

    async fn active_turns(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE thread_id = ? AND id > ? ORDER BY id ASC"
        ))
        .bind(thread_id.as_str())
        .bind(after.unwrap_or(0))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_turns(&rows)
    }

    async fn unindexed(
        &self,
        thread_id: &ThreadId,
        up_to: TurnId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TURN_COLUMNS} FROM conversation_turns
             WHERE thread_id = ? AND id <= ? AND indexed_at IS NULL
             ORDER BY id ASC"
        ))
        .bind(thread_id.as_str())
        .bind(up_to)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_turns(&rows)
    }

    async fn with_role(
        &self,
        thread_id: &ThreadId,
        role: TurnRole,
        after: Option<TurnId>,
        up_to: TurnId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM (
                 SELECT {TURN_COLUMNS} FROM conversation_turns
                 WHERE thread_id = ? AND role = ? AND id > ? AND id <= ?
                 ORDER BY id DESC LIMIT ?
             ) ORDER BY id ASC"
        ))
        .bind(thread_id.as_str())
        .bind(role.to_string())
        .bind(after.unwrap_or(0))
        .bind(up_to)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_turns(&rows)
    }

    async fn count_after(
        &self,
        thread_id: &ThreadId,
        after: Option<TurnId>,
    ) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM conversation_turns WHERE thread_id = ? AND id > ?",
        )
        .bind(thread_id.as_str())
        .bind(after.unwrap_or(0))
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let count: i64 = row.try_get("count").map_err(query_error)?;
        Ok(count as u64)
    }

    async fn mark_indexed(
        &self,
        ids: &[TurnId],
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        let at = format_datetime(&at);
        for id in ids {
            sqlx::query(
                "UPDATE conversation_turns SET indexed_at = ?, embedding_model = ? WHERE id = ?",
            )
            .bind(&at)
            .bind(model)
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadStats>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT thread_id,
                    COUNT(*) AS turn_count,
                    SUM(CASE WHEN indexed_at IS NULL THEN 1 ELSE 0 END) AS unindexed_count,
                    MAX(created_at) AS last_turn_at
             FROM conversation_turns
             GROUP BY thread_id
             ORDER BY MAX(id) DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in &rows {
            let thread_id: String = row.try_get("thread_id").map_err(query_error)?;
            let turn_count: i64 = row.try_get("turn_count").map_err(query_error)?;
            let unindexed_count: i64 = row.try_get("unindexed_count").map_err(query_error)?;
            let last_turn_at: String = row.try_get("last_turn_at").map_err(query_error)?;
            stats.push(ThreadStats {
                thread_id: ThreadId::new(thread_id)
                    .map_err(|e| RepositoryError::Query(format!("invalid thread_id: {e}")))?,
                turn_count: turn_count as u64,
                unindexed_count: unindexed_count as u64,
                last_turn_at: parse_datetime(&last_turn_at)?,
            });
        }
        Ok(stats)
    }

    async fn prune(
        &self,
        thread_id: &ThreadId,
        through: TurnId,
        policy: RetentionPolicy,
    ) -> Result<u64, RepositoryError> {
        match policy {
            RetentionPolicy::Archive => Ok(0),
            RetentionPolicy::Delete => {
                let result = sqlx::query(
                    "DELETE FROM conversation_turns
                     WHERE thread_id = ? AND id <= ? AND indexed_at IS NOT NULL",
                )
                .bind(thread_id.as_str())
                .bind(through)
                .execute(&self.pool.writer)
                .await
                .map_err(query_error)?;
                Ok(result.rows_affected())
            }
        }
    }
}
