use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// A single job posting.
///
/// `title`, `location`, `description` and `url` are opaque text as far as
/// the core is concerned; adapters fill them in however their source
/// presents them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobRecord {
    /// Stable dedup key. Adapters may leave this empty; the orchestrator
    /// derives it from (source, url) at ingestion. See [`record_id`].
    pub id: String,
    /// Identifier of the originating source.
    pub source: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub url: String,
    /// Posting time as reported by the source, when parseable.
    pub posted_at: Option<DateTime<Utc>>,
    /// Assigned by the orchestrator at ingestion, never by adapters.
    pub scraped_at: DateTime<Utc>,
}

/// An immutable, fully merged view of all known job records.
///
/// Records are sorted by `scraped_at` descending, tie-broken by `id`
/// ascending. Snapshots are replaced wholesale on each successful merge,
/// never mutated in place; `generated_at` lets queries see how stale the
/// data is without ever failing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<JobRecord>,
}

impl Snapshot {
    /// An empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Compute the stable record id for a (source, url) pair: SHA-256 hex over
/// the source id and the canonicalised URL.
///
/// Canonicalisation drops the fragment and lowercases the host so that
/// cosmetic URL variations don't defeat deduplication. Unparseable URLs
/// hash as-is.
pub fn record_id(source: &str, url: &str) -> String {
    let canonical = match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    };
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_deterministic() {
        let a = record_id("acme", "https://acme.example/jobs/1");
        let b = record_id("acme", "https://acme.example/jobs/1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_record_id_distinguishes_sources() {
        let a = record_id("acme", "https://acme.example/jobs/1");
        let b = record_id("globex", "https://acme.example/jobs/1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_id_ignores_fragment_and_host_case() {
        let a = record_id("acme", "https://ACME.example/jobs/1#apply");
        let b = record_id("acme", "https://acme.example/jobs/1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_id_unparseable_url_still_hashes() {
        let a = record_id("acme", "not a url");
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let snap = Snapshot {
            generated_at: Utc::now(),
            records: vec![JobRecord {
                id: record_id("acme", "https://acme.example/jobs/1"),
                source: "acme".into(),
                title: "Engineer".into(),
                location: "Remote".into(),
                description: "Build things".into(),
                url: "https://acme.example/jobs/1".into(),
                posted_at: None,
                scraped_at: Utc::now(),
            }],
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
