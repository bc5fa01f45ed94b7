//! Orchestrator and per-source configuration.
//!
//! Configuration is an explicit value handed to the orchestrator at
//! construction — there is no process-wide settings singleton, so multiple
//! orchestrators (e.g. in tests) never share state. A JSON file loader is
//! provided for the common case of a config file listing sources.

use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

/// Per-source scraping configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Stable source identifier (e.g. "acme").
    pub id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Endpoint reference handed to the source adapter, opaque to the core.
    pub endpoint: String,
    /// Adapter-specific selectors/parameters, opaque to the core.
    pub params: serde_json::Value,
    /// Minimum interval between two fetches of this source.
    pub min_interval: Duration,
    /// Maximum fetch attempts per cycle (first try included).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            enabled: true,
            endpoint: String::new(),
            params: serde_json::Value::Null,
            min_interval: Duration::from_millis(500),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Global orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on sources fetched in parallel.
    pub max_concurrent_scrapers: usize,
    /// Timeout applied to each individual fetch attempt.
    pub request_timeout: Duration,
    /// Overall deadline for one scrape cycle.
    pub cycle_deadline: Duration,
    /// Records older than this are evicted after each commit, when set.
    pub retention_age: Option<Duration>,
    pub sources: Vec<SourceConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scrapers: 3,
            request_timeout: Duration::from_secs(30),
            cycle_deadline: Duration::from_secs(300),
            retention_age: None,
            sources: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_scrapers = max.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cycle_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = deadline;
        self
    }

    pub fn with_retention_age(mut self, age: Duration) -> Self {
        self.retention_age = Some(age);
        self
    }

    /// Sources eligible for the next cycle.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Load configuration from a JSON file.
    ///
    /// The file carries durations as integer `*_secs`/`*_ms` fields; see
    /// [`file::ConfigFile`] for the exact shape.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let parsed: file::ConfigFile = serde_json::from_str(&text)?;
        Ok(parsed.into())
    }
}

/// On-disk configuration shape.
pub mod file {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ConfigFile {
        #[serde(default = "defaults::max_concurrent")]
        pub max_concurrent_scrapers: usize,
        #[serde(default = "defaults::request_timeout_secs")]
        pub request_timeout_secs: u64,
        #[serde(default = "defaults::cycle_deadline_secs")]
        pub cycle_deadline_secs: u64,
        #[serde(default)]
        pub retention_days: Option<u64>,
        #[serde(default)]
        pub sources: Vec<SourceEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SourceEntry {
        pub id: String,
        #[serde(default)]
        pub display_name: Option<String>,
        #[serde(default = "defaults::enabled")]
        pub enabled: bool,
        #[serde(default)]
        pub endpoint: String,
        #[serde(default)]
        pub params: serde_json::Value,
        #[serde(default = "defaults::min_interval_ms")]
        pub min_interval_ms: u64,
        #[serde(default = "defaults::max_attempts")]
        pub max_attempts: u32,
        #[serde(default = "defaults::base_delay_ms")]
        pub base_delay_ms: u64,
        #[serde(default = "defaults::max_delay_ms")]
        pub max_delay_ms: u64,
    }

    mod defaults {
        pub fn max_concurrent() -> usize {
            3
        }
        pub fn request_timeout_secs() -> u64 {
            30
        }
        pub fn cycle_deadline_secs() -> u64 {
            300
        }
        pub fn enabled() -> bool {
            true
        }
        pub fn min_interval_ms() -> u64 {
            500
        }
        pub fn max_attempts() -> u32 {
            3
        }
        pub fn base_delay_ms() -> u64 {
            1_000
        }
        pub fn max_delay_ms() -> u64 {
            30_000
        }
    }

    impl From<ConfigFile> for OrchestratorConfig {
        fn from(f: ConfigFile) -> Self {
            OrchestratorConfig {
                max_concurrent_scrapers: f.max_concurrent_scrapers.max(1),
                request_timeout: Duration::from_secs(f.request_timeout_secs),
                cycle_deadline: Duration::from_secs(f.cycle_deadline_secs),
                retention_age: f.retention_days.map(|d| Duration::from_secs(d * 86_400)),
                sources: f.sources.into_iter().map(Into::into).collect(),
            }
        }
    }

    impl From<SourceEntry> for SourceConfig {
        fn from(e: SourceEntry) -> Self {
            SourceConfig {
                display_name: e.display_name.unwrap_or_else(|| e.id.clone()),
                id: e.id,
                enabled: e.enabled,
                endpoint: e.endpoint,
                params: e.params,
                min_interval: Duration::from_millis(e.min_interval_ms),
                max_attempts: e.max_attempts,
                base_delay: Duration::from_millis(e.base_delay_ms),
                max_delay: Duration::from_millis(e.max_delay_ms),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defaults() {
        let src = SourceConfig::new("acme");
        assert_eq!(src.display_name, "acme");
        assert!(src.enabled);
        assert_eq!(src.min_interval, Duration::from_millis(500));
        assert_eq!(src.max_attempts, 3);
        assert_eq!(src.base_delay, Duration::from_secs(1));
        assert_eq!(src.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_enabled_sources_filters_disabled() {
        let config = OrchestratorConfig::default().with_sources(vec![
            SourceConfig::new("a"),
            SourceConfig::new("b").disabled(),
            SourceConfig::new("c"),
        ]);
        let ids: Vec<_> = config.enabled_sources().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_config_file_parsing() {
        let json = r#"{
            "max_concurrent_scrapers": 2,
            "request_timeout_secs": 10,
            "cycle_deadline_secs": 60,
            "retention_days": 30,
            "sources": [
                {"id": "acme", "endpoint": "https://acme.example/careers"},
                {"id": "globex", "enabled": false, "min_interval_ms": 2000}
            ]
        }"#;
        let parsed: file::ConfigFile = serde_json::from_str(json).unwrap();
        let config: OrchestratorConfig = parsed.into();

        assert_eq!(config.max_concurrent_scrapers, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.cycle_deadline, Duration::from_secs(60));
        assert_eq!(config.retention_age, Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].display_name, "acme");
        assert!(!config.sources[1].enabled);
        assert_eq!(config.sources[1].min_interval, Duration::from_millis(2000));
    }

    #[test]
    fn test_config_file_defaults() {
        let parsed: file::ConfigFile = serde_json::from_str(r#"{"sources": [{"id": "a"}]}"#).unwrap();
        let config: OrchestratorConfig = parsed.into();
        assert_eq!(config.max_concurrent_scrapers, 3);
        assert_eq!(config.sources[0].max_attempts, 3);
        assert!(config.retention_age.is_none());
    }
}
