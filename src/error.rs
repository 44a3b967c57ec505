//! Error types for the retrieval engine.
//!
//! | Variant | Meaning | Handling |
//! |---------|---------|----------|
//! | [`RecallError::Provider`] | Embedding call failed | Skip the item (ingestion, cache load); fail the query only when it is the query's own embedding |
//! | [`RecallError::Repository`] | Content or relationship store call failed | Skip the item during cache load; surface otherwise |
//! | [`RecallError::Configuration`] | Missing credentials, malformed filters | Surface, never retry |
//! | [`RecallError::EmbeddingUnavailable`] | No query embedding could be obtained | Surface as an explicit search failure |
//! | [`RecallError::DimensionMismatch`] | Provider returned a vector of the wrong size | Treated like a provider failure |
//! | [`RecallError::Compression`] | Stored content could not be decompressed | Skip the item |
//!
//! Running out of context budget is deliberately absent: it is reported
//! through compression stats, not as an error.

use thiserror::Error;

/// Top-level error for engine, cache, repository and provider operations.
#[derive(Debug, Error)]
pub enum RecallError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Compression error: {0}")]
    Compression(String),
}

impl RecallError {
    /// True for failures that affect a single item and may succeed on a
    /// later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecallError::Provider(_)
                | RecallError::Repository(_)
                | RecallError::Compression(_)
                | RecallError::DimensionMismatch { .. }
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        RecallError::Configuration(message.into())
    }
}

impl From<sqlx::Error> for RecallError {
    fn from(e: sqlx::Error) -> Self {
        RecallError::Repository(e.to_string())
    }
}

/// Result alias used across the app crate.
pub type Result<T> = std::result::Result<T, RecallError>;

/// Failures talking to an embedding provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider disabled")]
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RecallError::from(ProviderError::Timeout(30)).is_transient());
        assert!(RecallError::Repository("gone".into()).is_transient());
        assert!(!RecallError::config("bad filter").is_transient());
        assert!(!RecallError::EmbeddingUnavailable("down".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let e = RecallError::DimensionMismatch {
            expected: 1536,
            actual: 384,
        };
        assert_eq!(e.to_string(), "Embedding has 384 dimensions, expected 1536");
        let e = RecallError::from(ProviderError::Api {
            status_code: 401,
            message: "bad key".into(),
        });
        assert_eq!(
            e.to_string(),
            "Provider error: API request failed: bad key (status: 401)"
        );
    }
}
