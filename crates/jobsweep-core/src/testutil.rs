//! Test utilities: mock implementations of the core seams.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::SourceConfig;
use crate::error::AppError;
use crate::models::{JobRecord, Snapshot};
use crate::source::SourceAdapter;
use crate::store::{MemoryStore, SnapshotStore};

/// Create a job record for tests. `key` doubles as the id and the tail of
/// the url, keeping assertions readable.
pub fn make_record(source: &str, key: &str, scraped_at: DateTime<Utc>) -> JobRecord {
    JobRecord {
        id: key.to_string(),
        source: source.to_string(),
        title: format!("{key} role"),
        location: "Remote".to_string(),
        description: format!("Description for {key}"),
        url: format!("https://{source}.example/jobs/{key}"),
        posted_at: None,
        scraped_at,
    }
}

/// Create a record the way an adapter would: no id, placeholder scraped_at.
/// The orchestrator derives the id and stamps the ingestion time.
pub fn make_raw_record(source: &str, key: &str) -> JobRecord {
    JobRecord {
        id: String::new(),
        source: source.to_string(),
        title: format!("{key} role"),
        location: "Remote".to_string(),
        description: format!("Description for {key}"),
        url: format!("https://{source}.example/jobs/{key}"),
        posted_at: None,
        scraped_at: DateTime::<Utc>::MIN_UTC,
    }
}

/// Mock source adapter with a per-source queue of responses.
///
/// Each fetch pops the next queued response for that source; an exhausted
/// (or unknown) source yields an empty batch. Call counts are recorded per
/// source so tests can assert on attempts.
#[derive(Clone)]
pub struct MockAdapter {
    responses: Arc<Mutex<HashMap<String, Vec<Result<Vec<JobRecord>, AppError>>>>>,
    pub calls: Arc<Mutex<HashMap<String, u32>>>,
    /// Artificial latency per fetch, for timeout/deadline tests.
    latency: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            latency: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue responses for a source, consumed in order.
    pub fn with_responses(
        self,
        source_id: &str,
        responses: Vec<Result<Vec<JobRecord>, AppError>>,
    ) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(source_id.to_string(), responses);
        self
    }

    /// Make every fetch of `source_id` sleep before responding.
    pub fn with_latency(self, source_id: &str, latency: Duration) -> Self {
        self.latency
            .lock()
            .unwrap()
            .insert(source_id.to_string(), latency);
        self
    }

    pub fn call_count(&self, source_id: &str) -> u32 {
        self.calls.lock().unwrap().get(source_id).copied().unwrap_or(0)
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for MockAdapter {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<JobRecord>, AppError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(source.id.clone())
            .or_insert(0) += 1;

        let latency = self.latency.lock().unwrap().get(&source.id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&source.id) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Ok(vec![]),
        }
    }
}

/// Snapshot store whose `replace` always fails with a commit error.
///
/// Reads keep serving whatever snapshot it was built with, mirroring a
/// store whose disk went away after startup.
#[derive(Clone)]
pub struct FailingStore {
    memory: MemoryStore,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            memory: MemoryStore::new(),
        }
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            memory: MemoryStore::with_snapshot(snapshot),
        }
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for FailingStore {
    fn read(&self) -> std::sync::Arc<Snapshot> {
        self.memory.read()
    }

    fn replace(&self, _snapshot: Snapshot) -> Result<(), AppError> {
        Err(AppError::StoreCommitError("replace disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_adapter_pops_responses_in_order() {
        let adapter = MockAdapter::new().with_responses(
            "acme",
            vec![
                Err(AppError::Timeout(1)),
                Ok(vec![make_raw_record("acme", "1")]),
            ],
        );
        let source = SourceConfig::new("acme");

        assert!(adapter.fetch(&source).await.is_err());
        assert_eq!(adapter.fetch(&source).await.unwrap().len(), 1);
        // Exhausted queue falls back to empty batches.
        assert!(adapter.fetch(&source).await.unwrap().is_empty());
        assert_eq!(adapter.call_count("acme"), 3);
    }
}
