//! LanceDB vector store wrapper for connection management and table operations.
//!
//! Provides `LanceVectorStore` which wraps a `lancedb::Connection` and offers
//! helpers to create and open per-thread turn tables from Arrow schemas.

use std::path::PathBuf;
use std::sync::Arc;

use arrow_schema::Schema;
use sha2::{Digest, Sha256};

use mnemo_types::thread::ThreadId;

/// LanceDB vector store wrapper for connection and table management.
///
/// Manages a single LanceDB connection at a filesystem path.
/// Each thread gets its own turn table (`thread_turns_{hash}`).
pub struct LanceVectorStore {
    db: lancedb::Connection,
}

impl LanceVectorStore {
    /// Open or create a LanceDB vector store at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;

        Ok(Self { db })
    }

    /// Ensure a table exists with the given schema.
    ///
    /// If the table already exists, opens it. If not, creates an empty table
    /// with the provided schema.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Open a table if it exists.
    pub async fn open_table(&self, table_name: &str) -> Result<Option<lancedb::Table>, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn table_exists(&self, table_name: &str) -> bool {
        matches!(self.open_table(table_name).await, Ok(Some(_)))
    }

    /// List all table names in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    /// Table name for a thread's turn embeddings.
    ///
    /// Thread ids are arbitrary strings, so the name is derived from the
    /// first 8 bytes of their SHA-256 digest.
    pub fn thread_table_name(thread_id: &ThreadId) -> String {
        let digest = Sha256::digest(thread_id.as_str().as_bytes());
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        format!("thread_turns_{hex}")
    }
}
