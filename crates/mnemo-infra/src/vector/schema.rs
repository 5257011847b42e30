//! Arrow schema definitions for LanceDB vector tables.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Schema for per-thread turn tables (`thread_turns_{hash}`).
///
/// The vector width is fixed per table; it comes from the configured
/// embedding model.
pub fn turn_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("turn_id", DataType::Int64, false),
        Field::new("thread_id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("vector", vector_type(dimension), false),
    ])
}

pub fn vector_type(dimension: i32) -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
    )
}
