//! Background maintenance after a response has been returned.
//!
//! `MaintenancePipeline` runs the index -> extract -> summarize stages for
//! one job; `MaintenanceQueue` persists jobs, serializes them per thread
//! and retries storage failures with exponential backoff.

pub mod pipeline;
pub mod queue;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use mnemo_types::error::MemoryError;
use mnemo_types::maintenance::{MaintenanceJob, MaintenanceReport};

/// Object-safe executor of a single maintenance job.
///
/// The queue only needs this seam, so it stays independent of the
/// repository types behind the pipeline.
pub trait JobRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        job: &'a MaintenanceJob,
    ) -> Pin<Box<dyn Future<Output = Result<MaintenanceReport, MemoryError>> + Send + 'a>>;
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
}
