use mnemo_types::error::RepositoryError;
use mnemo_types::summary::ConversationSummary;
use mnemo_types::thread::ThreadId;

/// Repository trait for the running summary of each thread.
pub trait SummaryRepository: Send + Sync {
    fn get(
        &self,
        thread_id: &ThreadId,
    ) -> impl std::future::Future<Output = Result<Option<ConversationSummary>, RepositoryError>> + Send;

    /// Replace the thread's summary. `covers_through` must never move backwards.
    fn save(
        &self,
        summary: &ConversationSummary,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
