use mnemo_types::error::RepositoryError;
use mnemo_types::profile::{ProfileAttribute, UserProfile};
use mnemo_types::thread::ThreadId;
use mnemo_types::turn::TurnId;

/// Repository trait for per-thread user profiles.
pub trait ProfileRepository: Send + Sync {
    /// Load the profile. A thread without attributes yields an empty profile.
    fn get(
        &self,
        thread_id: &ThreadId,
    ) -> impl std::future::Future<Output = Result<UserProfile, RepositoryError>> + Send;

    /// Insert or overwrite the given attributes (last write wins).
    fn upsert(
        &self,
        thread_id: &ThreadId,
        attributes: &[ProfileAttribute],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Newest turn id whose user turns have already been extracted.
    fn extracted_through(
        &self,
        thread_id: &ThreadId,
    ) -> impl std::future::Future<Output = Result<Option<TurnId>, RepositoryError>> + Send;

    /// Advance the extraction watermark. Never moves it backwards.
    fn mark_extracted(
        &self,
        thread_id: &ThreadId,
        through: TurnId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
