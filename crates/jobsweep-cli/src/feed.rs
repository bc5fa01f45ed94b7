//! Local JSON-feed source adapter.
//!
//! Treats each source's `endpoint` as a path to a JSON file holding an
//! array of postings. This keeps real transports (HTTP, browser
//! automation) out of the core workspace while exercising the full
//! orchestration path; production deployments swap in their own adapters
//! behind the same trait.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use jobsweep_core::config::SourceConfig;
use jobsweep_core::error::AppError;
use jobsweep_core::models::JobRecord;
use jobsweep_core::source::SourceAdapter;

/// One posting as it appears in a feed file.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    title: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    url: String,
    #[serde(default)]
    posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct JsonFeedAdapter;

impl SourceAdapter for JsonFeedAdapter {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<JobRecord>, AppError> {
        if source.endpoint.is_empty() {
            return Err(AppError::ConfigError(format!(
                "source '{}' has no endpoint",
                source.id
            )));
        }

        let text = match tokio::fs::read_to_string(&source.endpoint).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::ConfigError(format!(
                    "feed file not found: {}",
                    source.endpoint
                )));
            }
            // Other IO failures may be transient (network mounts etc).
            Err(e) => return Err(AppError::NetworkError(e.to_string())),
        };

        let entries: Vec<FeedEntry> = serde_json::from_str(&text)
            .map_err(|e| AppError::ParseError(format!("{}: {e}", source.endpoint)))?;

        Ok(entries
            .into_iter()
            .map(|entry| JobRecord {
                // Derived by the orchestrator at ingestion.
                id: String::new(),
                source: source.id.clone(),
                title: entry.title,
                location: entry.location,
                description: entry.description,
                url: entry.url,
                posted_at: entry.posted_at,
                scraped_at: DateTime::<Utc>::MIN_UTC,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_feed(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn parses_feed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = write_feed(
            &dir,
            "acme.json",
            r#"[{"title": "Engineer", "url": "https://acme.example/jobs/1", "location": "Remote"}]"#,
        );
        let source = SourceConfig::new("acme").with_endpoint(endpoint);

        let records = JsonFeedAdapter.fetch(&source).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "acme");
        assert_eq!(records[0].title, "Engineer");
        assert!(records[0].id.is_empty(), "id left for the orchestrator");
    }

    #[tokio::test]
    async fn missing_feed_is_a_config_error() {
        let source = SourceConfig::new("acme").with_endpoint("/nonexistent/feed.json");
        let err = JsonFeedAdapter.fetch(&source).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_feed_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = write_feed(&dir, "bad.json", "{not json");
        let source = SourceConfig::new("acme").with_endpoint(endpoint);

        let err = JsonFeedAdapter.fetch(&source).await.unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[tokio::test]
    async fn empty_endpoint_is_rejected() {
        let source = SourceConfig::new("acme");
        let err = JsonFeedAdapter.fetch(&source).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
