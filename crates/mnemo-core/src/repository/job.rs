//! Maintenance job repository trait definition.
//!
//! Jobs are persisted before they are dispatched to a worker and removed
//! once the pipeline has finished, which gives at-least-once execution
//! across restarts.

use uuid::Uuid;

use mnemo_types::error::RepositoryError;
use mnemo_types::maintenance::MaintenanceJob;

pub trait MaintenanceJobRepository: Send + Sync {
    fn save(
        &self,
        job: &MaintenanceJob,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist attempt bookkeeping (count, error, next attempt time).
    fn update(
        &self,
        job: &MaintenanceJob,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Jobs with fewer than `max_attempts` attempts, oldest first.
    ///
    /// Jobs whose `next_attempt_at` lies in the future are included; the
    /// worker waits for it before running them.
    fn list_pending(
        &self,
        max_attempts: u32,
    ) -> impl std::future::Future<Output = Result<Vec<MaintenanceJob>, RepositoryError>> + Send;

    /// Every persisted job, including abandoned ones, oldest first.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<MaintenanceJob>, RepositoryError>> + Send;
}
