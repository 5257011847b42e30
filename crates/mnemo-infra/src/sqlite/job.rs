//! SQLite maintenance job repository implementation.
//!
//! Same bookkeeping columns as a retry queue: attempt count, last/next
//! attempt time and the last error message.

use sqlx::Row;
use uuid::Uuid;

use mnemo_core::repository::job::MaintenanceJobRepository;
use mnemo_types::error::RepositoryError;
use mnemo_types::maintenance::MaintenanceJob;
use mnemo_types::thread::ThreadId;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

pub struct SqliteJobRepository {
    pool: DatabasePool,
}

impl SqliteJobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct JobRow {
    id: String,
    thread_id: String,
    turn_id: i64,
    summarize: i64,
    attempt_count: i64,
    last_attempt_at: Option<String>,
    next_attempt_at: String,
    last_error: Option<String>,
    created_at: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            turn_id: row.try_get("turn_id")?,
            summarize: row.try_get("summarize")?,
            attempt_count: row.try_get("attempt_count")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_job(self) -> Result<MaintenanceJob, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid job id: {e}")))?;
        let thread_id = ThreadId::new(self.thread_id)
            .map_err(|e| RepositoryError::Query(format!("invalid thread_id: {e}")))?;
        let last_attempt_at = self
            .last_attempt_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;

        Ok(MaintenanceJob {
            id,
            thread_id,
            turn_id: self.turn_id,
            summarize: self.summarize != 0,
            attempt_count: self.attempt_count as u32,
            last_attempt_at,
            next_attempt_at: parse_datetime(&self.next_attempt_at)?,
            last_error: self.last_error,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn map_jobs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<MaintenanceJob>, RepositoryError> {
    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        jobs.push(JobRow::from_row(row).map_err(query_error)?.into_job()?);
    }
    Ok(jobs)
}

impl MaintenanceJobRepository for SqliteJobRepository {
    async fn save(&self, job: &MaintenanceJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO maintenance_jobs (id, thread_id, turn_id, summarize, attempt_count, last_attempt_at, next_attempt_at, last_error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.id.to_string())
        .bind(job.thread_id.as_str())
        .bind(job.turn_id)
        .bind(if job.summarize { 1i64 } else { 0i64 })
        .bind(job.attempt_count as i64)
        .bind(job.last_attempt_at.as_ref().map(format_datetime))
        .bind(format_datetime(&job.next_attempt_at))
        .bind(&job.last_error)
        .bind(format_datetime(&job.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!("job {} already exists", job.id));
                }
            }
            query_error(e)
        })?;

        Ok(())
    }

    async fn update(&self, job: &MaintenanceJob) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE maintenance_jobs
               SET attempt_count = ?, last_attempt_at = ?, next_attempt_at = ?, last_error = ?
               WHERE id = ?"#,
        )
        .bind(job.attempt_count as i64)
        .bind(job.last_attempt_at.as_ref().map(format_datetime))
        .bind(format_datetime(&job.next_attempt_at))
        .bind(&job.last_error)
        .bind(job.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM maintenance_jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn list_pending(&self, max_attempts: u32) -> Result<Vec<MaintenanceJob>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM maintenance_jobs WHERE attempt_count < ? ORDER BY id ASC",
        )
        .bind(i64::from(max_attempts))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        map_jobs(&rows)
    }

    async fn list(&self) -> Result<Vec<MaintenanceJob>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM maintenance_jobs ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        map_jobs(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use chrono::Utc;

    fn job(thread: &str, turn_id: i64) -> MaintenanceJob {
        MaintenanceJob::new(ThreadId::new(thread).unwrap(), turn_id, false)
    }

    #[tokio::test]
    async fn test_save_list_delete() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteJobRepository::new(pool);

        let first = job("t1", 2);
        let second = MaintenanceJob {
            summarize: true,
            ..job("t2", 4)
        };
        repo.save(&first).await.unwrap();
        repo.save(&second).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert!(all[1].summarize);

        repo.delete(&first.id).await.unwrap();
        // Deleting twice is not an error.
        repo.delete(&first.id).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_save_conflicts() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteJobRepository::new(pool);
        let j = job("t1", 1);
        repo.save(&j).await.unwrap();
        assert!(matches!(
            repo.save(&j).await.unwrap_err(),
            RepositoryError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_update_and_list_pending_excludes_exhausted() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteJobRepository::new(pool);

        let mut exhausted = job("t1", 1);
        let fresh = job("t1", 2);
        repo.save(&exhausted).await.unwrap();
        repo.save(&fresh).await.unwrap();

        exhausted.attempt_count = 3;
        exhausted.last_attempt_at = Some(Utc::now());
        exhausted.last_error = Some("embedding service unavailable".to_string());
        repo.update(&exhausted).await.unwrap();

        let pending = repo.list_pending(3).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);

        let stored = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .find(|j| j.id == exhausted.id)
            .unwrap();
        assert_eq!(stored.attempt_count, 3);
        assert_eq!(stored.last_error.as_deref(), Some("embedding service unavailable"));
    }

    #[tokio::test]
    async fn test_update_missing_job_is_not_found() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteJobRepository::new(pool);
        let err = repo.update(&job("t1", 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
