use thiserror::Error;

/// Application-wide error types for jobsweep.
///
/// Fetch failures are split into transient variants (worth retrying) and
/// permanent variants (surfaced immediately). The classification is chosen
/// by the source adapter when it constructs the error; nothing downstream
/// re-interprets message strings.
#[derive(Error, Debug)]
pub enum AppError {
    /// Network/connection failure while contacting a source. Transient.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A fetch attempt exceeded its timeout. Transient.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// The source answered with a rate-limit response. Transient.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The fetched payload did not match the expected shape. Permanent.
    #[error("source parse error: {0}")]
    ParseError(String),

    /// The source rejected our credentials. Permanent.
    #[error("authentication rejected: {0}")]
    AuthError(String),

    /// Malformed or missing source configuration. Permanent.
    #[error("invalid source configuration: {0}")]
    ConfigError(String),

    /// The scrape cycle's overall deadline expired.
    #[error("cycle deadline exceeded")]
    DeadlineExceeded,

    /// Persisting a snapshot failed; the previous snapshot stays authoritative.
    #[error("snapshot commit failed: {0}")]
    StoreCommitError(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!AppError::ParseError("missing field".into()).is_retryable());
        assert!(!AppError::AuthError("401".into()).is_retryable());
        assert!(!AppError::ConfigError("no endpoint".into()).is_retryable());
        assert!(!AppError::DeadlineExceeded.is_retryable());
        assert!(!AppError::StoreCommitError("disk full".into()).is_retryable());
    }
}
