//! SQLite summary repository implementation.

use sqlx::Row;

use mnemo_core::repository::summary::SummaryRepository;
use mnemo_types::error::RepositoryError;
use mnemo_types::summary::ConversationSummary;
use mnemo_types::thread::ThreadId;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

pub struct SqliteSummaryRepository {
    pool: DatabasePool,
}

impl SqliteSummaryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl SummaryRepository for SqliteSummaryRepository {
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<ConversationSummary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT content, covers_through, summarized_turns, updated_at
             FROM conversation_summaries WHERE thread_id = ?",
        )
        .bind(thread_id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let content: String = row.try_get("content").map_err(query_error)?;
        let covers_through: i64 = row.try_get("covers_through").map_err(query_error)?;
        let summarized_turns: i64 = row.try_get("summarized_turns").map_err(query_error)?;
        let updated_at: String = row.try_get("updated_at").map_err(query_error)?;

        Ok(Some(ConversationSummary {
            thread_id: thread_id.clone(),
            content,
            covers_through,
            summarized_turns: summarized_turns as u64,
            updated_at: parse_datetime(&updated_at)?,
        }))
    }

    async fn save(&self, summary: &ConversationSummary) -> Result<(), RepositoryError> {
        // The WHERE clause keeps the boundary monotonic even if two writers race.
        let result = sqlx::query(
            r#"INSERT INTO conversation_summaries (thread_id, content, covers_through, summarized_turns, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(thread_id) DO UPDATE SET
                   content = excluded.content,
                   covers_through = excluded.covers_through,
                   summarized_turns = excluded.summarized_turns,
                   updated_at = excluded.updated_at
               WHERE excluded.covers_through >= conversation_summaries.covers_through"#,
        )
        .bind(summary.thread_id.as_str())
        .bind(&summary.content)
        .bind(summary.covers_through)
        .bind(summary.summarized_turns as i64)
        .bind(format_datetime(&summary.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "summary for thread '{}' already covers past turn {}",
                summary.thread_id, summary.covers_through
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use chrono::Utc;

    fn summary(content: &str, covers_through: i64, turns: u64) -> ConversationSummary {
        ConversationSummary {
            thread_id: ThreadId::new("t1").unwrap(),
            content: content.to_string(),
            covers_through,
            summarized_turns: turns,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_replace() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteSummaryRepository::new(pool);
        let t = ThreadId::new("t1").unwrap();
        assert!(repo.get(&t).await.unwrap().is_none());

        repo.save(&summary("User is Sam.", 4, 4)).await.unwrap();
        repo.save(&summary("User is Sam from Boston.", 8, 8)).await.unwrap();

        let loaded = repo.get(&t).await.unwrap().unwrap();
        assert_eq!(loaded.content, "User is Sam from Boston.");
        assert_eq!(loaded.covers_through, 8);
        assert_eq!(loaded.summarized_turns, 8);
    }

    #[tokio::test]
    async fn test_boundary_never_moves_backwards() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteSummaryRepository::new(pool);

        repo.save(&summary("newer", 8, 8)).await.unwrap();
        let err = repo.save(&summary("older", 4, 4)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let loaded = repo.get(&ThreadId::new("t1").unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.content, "newer");
    }
}
