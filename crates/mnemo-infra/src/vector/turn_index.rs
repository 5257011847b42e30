//! LanceDB-backed per-thread turn index.
//!
//! Implements `TurnVectorIndex` from `mnemo-core`. Each thread has an
//! isolated table, so a query can only ever match that thread's turns.
//! Search uses cosine distance and reports `1 - distance` as similarity;
//! thresholding happens in the memory service.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use mnemo_core::memory::index::TurnVectorIndex;
use mnemo_core::memory::similarity::similarity_from_distance;
use mnemo_types::error::RepositoryError;
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::{ConversationTurn, SimilarityResult};

use super::lance::LanceVectorStore;
use super::schema::turn_schema;

pub struct LanceTurnIndex {
    store: LanceVectorStore,
    dimension: usize,
}

impl LanceTurnIndex {
    pub fn new(store: LanceVectorStore, dimension: usize) -> Self {
        Self { store, dimension }
    }

    async fn ensure_thread_table(&self, thread_id: &ThreadId) -> Result<lancedb::Table, RepositoryError> {
        let table_name = LanceVectorStore::thread_table_name(thread_id);
        let schema = Arc::new(turn_schema(self.dimension as i32));
        self.store
            .ensure_table(&table_name, schema)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure thread table: {e}")))
    }

    async fn existing_thread_table(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<lancedb::Table>, RepositoryError> {
        let table_name = LanceVectorStore::thread_table_name(thread_id);
        self.store
            .open_table(&table_name)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to open thread table: {e}")))
    }

    fn build_record_batch(
        &self,
        turn: &ConversationTurn,
        model: &str,
        vector: &[f32],
    ) -> Result<RecordBatch, RepositoryError> {
        let schema = Arc::new(turn_schema(self.dimension as i32));

        let values = Float32Array::from(vector.to_vec());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values),
            None,
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build vector column: {e}")))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![turn.id])),
                Arc::new(StringArray::from(vec![turn.thread_id.to_string()])),
                Arc::new(StringArray::from(vec![turn.content.clone()])),
                Arc::new(StringArray::from(vec![turn.created_at.to_rfc3339()])),
                Arc::new(StringArray::from(vec![model.to_string()])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<SimilarityResult>, RepositoryError> {
        let turn_ids = column::<Int64Array>(batch, "turn_id")?;
        let thread_ids = column::<StringArray>(batch, "thread_id")?;
        let contents = column::<StringArray>(batch, "content")?;
        // The _distance column is added by LanceDB vector search
        let distances = column::<Float32Array>(batch, "_distance")?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let thread_id = ThreadId::new(thread_ids.value(i))
                .map_err(|e| RepositoryError::Query(format!("invalid thread_id in index: {e}")))?;
            let distance = if distances.is_null(i) {
                f32::NAN
            } else {
                distances.value(i)
            };
            results.push(SimilarityResult {
                turn_id: turn_ids.value(i),
                thread_id,
                content: contents.value(i).to_string(),
                similarity: similarity_from_distance(distance),
            });
        }
        Ok(results)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RepositoryError::Query(format!("missing or mistyped column '{name}'")))
}

impl TurnVectorIndex for LanceTurnIndex {
    async fn upsert(
        &self,
        turn: &ConversationTurn,
        model: &str,
        vector: &[f32],
    ) -> Result<(), RepositoryError> {
        if vector.len() != self.dimension {
            return Err(RepositoryError::Query(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        let table = self.ensure_thread_table(&turn.thread_id).await?;

        // Replace any earlier entry for the same turn.
        table
            .delete(&format!("turn_id = {}", turn.id))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to replace turn vector: {e}")))?;

        let batch = self.build_record_batch(turn, model, vector)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add turn vector: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        thread_id: &ThreadId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, RepositoryError> {
        let Some(table) = self.existing_thread_table(thread_id).await? else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .vector_search(query)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut matches = Vec::new();
        for batch in batches.iter().filter(|b| b.num_rows() > 0) {
            matches.extend(Self::batch_to_results(batch)?);
        }
        Ok(matches)
    }

    async fn count(&self, thread_id: &ThreadId) -> Result<u64, RepositoryError> {
        match self.existing_thread_table(thread_id).await? {
            Some(table) => table
                .count_rows(None)
                .await
                .map(|n| n as u64)
                .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}"))),
            None => Ok(0),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
