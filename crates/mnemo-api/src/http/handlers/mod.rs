//! REST API handler modules.

pub mod jobs;
pub mod memory;
pub mod threads;

use mnemo_types::thread::ThreadId;

use crate::http::error::AppError;

/// Validate a thread id taken from the URL path.
pub(crate) fn thread_id(raw: String) -> Result<ThreadId, AppError> {
    Ok(ThreadId::new(raw)?)
}
