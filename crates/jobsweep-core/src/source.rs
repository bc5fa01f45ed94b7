use std::future::Future;

use crate::config::SourceConfig;
use crate::error::AppError;
use crate::models::JobRecord;

/// Fetches and parses job postings for one source.
///
/// Implementations are source-specific and live outside the core; the
/// orchestrator depends only on this seam, so adding a source never touches
/// orchestration logic. Errors must carry the transient/permanent split via
/// the [`AppError`] variant — the retry policy acts on that classification
/// alone.
///
/// Adapters may leave `id` empty and should not set `scraped_at`; both are
/// filled in by the orchestrator at ingestion.
pub trait SourceAdapter: Send + Sync + Clone {
    fn fetch(
        &self,
        source: &SourceConfig,
    ) -> impl Future<Output = Result<Vec<JobRecord>, AppError>> + Send;
}

/// Adapter that always returns an empty batch. Useful as a placeholder in
/// wiring that never actually fetches.
#[derive(Debug, Clone)]
pub struct NullAdapter;

impl SourceAdapter for NullAdapter {
    async fn fetch(&self, _source: &SourceConfig) -> Result<Vec<JobRecord>, AppError> {
        Ok(vec![])
    }
}
