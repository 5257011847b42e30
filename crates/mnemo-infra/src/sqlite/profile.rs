//! SQLite profile repository implementation.
//!
//! One row per `(thread_id, attribute)`; values are stored as JSON text.

use std::collections::BTreeMap;

use sqlx::Row;

use mnemo_core::repository::profile::ProfileRepository;
use mnemo_types::error::RepositoryError;
use mnemo_types::profile::{ProfileAttribute, UserProfile};
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::TurnId;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

pub struct SqliteProfileRepository {
    pool: DatabasePool,
}

impl SqliteProfileRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct AttributeRow {
    attribute: String,
    value_json: String,
    source_turn_id: Option<i64>,
    updated_at: String,
}

impl AttributeRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            attribute: row.try_get("attribute")?,
            value_json: row.try_get("value_json")?,
            source_turn_id: row.try_get("source_turn_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_attribute(self) -> Result<ProfileAttribute, RepositoryError> {
        let value = serde_json::from_str(&self.value_json)
            .map_err(|e| RepositoryError::Query(format!("invalid JSON value: {e}")))?;
        Ok(ProfileAttribute {
            name: self.attribute,
            value,
            source_turn_id: self.source_turn_id,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl ProfileRepository for SqliteProfileRepository {
    async fn get(&self, thread_id: &ThreadId) -> Result<UserProfile, RepositoryError> {
        let rows = sqlx::query(
            "SELECT attribute, value_json, source_turn_id, updated_at
             FROM user_profile_attributes WHERE thread_id = ? ORDER BY attribute",
        )
        .bind(thread_id.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut attributes = BTreeMap::new();
        for row in &rows {
            let attr = AttributeRow::from_row(row)
                .map_err(query_error)?
                .into_attribute()?;
            attributes.insert(attr.name.clone(), attr);
        }

        Ok(UserProfile {
            thread_id: thread_id.clone(),
            attributes,
        })
    }

    async fn upsert(
        &self,
        thread_id: &ThreadId,
        attributes: &[ProfileAttribute],
    ) -> Result<(), RepositoryError> {
        if attributes.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        for attr in attributes {
            let value_json = serde_json::to_string(&attr.value)
                .map_err(|e| RepositoryError::Query(format!("failed to encode value: {e}")))?;
            sqlx::query(
                r#"INSERT INTO user_profile_attributes (thread_id, attribute, value_json, source_turn_id, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(thread_id, attribute) DO UPDATE SET
                       value_json = excluded.value_json,
                       source_turn_id = excluded.source_turn_id,
                       updated_at = excluded.updated_at"#,
            )
            .bind(thread_id.as_str())
            .bind(&attr.name)
            .bind(value_json)
            .bind(attr.source_turn_id)
            .bind(format_datetime(&attr.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn extracted_through(&self, thread_id: &ThreadId) -> Result<Option<TurnId>, RepositoryError> {
        let row = sqlx::query("SELECT extracted_through FROM profile_extraction_state WHERE thread_id = ?")
            .bind(thread_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|r| r.try_get("extracted_through"))
            .transpose()
            .map_err(query_error)
    }

    async fn mark_extracted(&self, thread_id: &ThreadId, through: TurnId) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO profile_extraction_state (thread_id, extracted_through, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(thread_id) DO UPDATE SET
                   extracted_through = MAX(extracted_through, excluded.extracted_through),
                   updated_at = excluded.updated_at"#,
        )
        .bind(thread_id.as_str())
        .bind(through)
        .bind(format_datetime(&chrono::Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;
    use chrono::Utc;
    use serde_json::json;

    fn attr(name: &str, value: serde_json::Value, source: Option<i64>) -> ProfileAttribute {
        ProfileAttribute {
            name: name.to_string(),
            value,
            source_turn_id: source,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_profile_is_empty() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteProfileRepository::new(pool);
        let t = ThreadId::new("t1").unwrap();

        let profile = repo.get(&t).await.unwrap();
        assert!(profile.is_empty());
        assert_eq!(profile.thread_id, t);
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteProfileRepository::new(pool);
        let t = ThreadId::new("t1").unwrap();

        repo.upsert(
            &t,
            &[
                attr("location", json!("Boston"), Some(1)),
                attr("interests", json!(["hiking", "jazz"]), Some(1)),
            ],
        )
        .await
        .unwrap();
        repo.upsert(&t, &[attr("location", json!("New York"), Some(5))])
            .await
            .unwrap();

        let profile = repo.get(&t).await.unwrap();
        assert_eq!(profile.get("location"), Some(&json!("New York")));
        assert_eq!(profile.get("interests"), Some(&json!(["hiking", "jazz"])));
        assert_eq!(profile.attributes["location"].source_turn_id, Some(5));
    }

    #[tokio::test]
    async fn test_profiles_are_scoped_per_thread() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteProfileRepository::new(pool);
        let a = ThreadId::new("a").unwrap();
        let b = ThreadId::new("b").unwrap();

        repo.upsert(&a, &[attr("name", json!("Sam"), None)]).await.unwrap();
        assert!(repo.get(&b).await.unwrap().is_empty());
        assert_eq!(repo.get(&a).await.unwrap().attributes.len(), 1);
    }

    #[tokio::test]
    async fn test_extraction_watermark_only_moves_forward() {
        let (pool, _dir) = test_pool().await;
        let repo = SqliteProfileRepository::new(pool);
        let t = ThreadId::new("t1").unwrap();
        let other = ThreadId::new("t2").unwrap();

        assert_eq!(repo.extracted_through(&t).await.unwrap(), None);

        repo.mark_extracted(&t, 7).await.unwrap();
        repo.mark_extracted(&t, 3).await.unwrap();
        assert_eq!(repo.extracted_through(&t).await.unwrap(), Some(7));

        repo.mark_extracted(&t, 12).await.unwrap();
        assert_eq!(repo.extracted_through(&t).await.unwrap(), Some(12));
        assert_eq!(repo.extracted_through(&other).await.unwrap(), None);
    }
}
