//! Error types for Vigil Core
//!
//! One `thiserror` taxonomy for every failure mode in the collection,
//! sealing, and analysis paths. Non-fatal conditions (`TooEarly`,
//! `CollectionInProgress`) are ordinary variants so callers can branch on
//! them; soft per-item collection failures are not errors at all, they are
//! recorded in the batch report.

use thiserror::Error;

/// Result type alias for Vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for Vigil operations
#[derive(Error, Debug)]
pub enum VigilError {
    /// Transient network failure that survived the whole retry budget
    #[error("network error after {attempts} attempts: {message}")]
    Network { message: String, attempts: u32 },

    /// Snapshot content read attempted before the seal was unlocked
    #[error("sealed: snapshot content is not readable before unlock")]
    SealedAccessDenied,

    /// Unlock attempted before the committed target time
    #[error("too early: {remaining_secs}s remain until the unlock target")]
    TooEarly { remaining_secs: i64 },

    /// Chain or registry hash mismatch discovered at unlock time
    #[error("integrity violation: expected {expected}, recomputed {actual}")]
    IntegrityViolation { expected: String, actual: String },

    /// A seal record already exists
    #[error("already sealed: a seal record exists and cannot be replaced")]
    AlreadySealed,

    /// Unlock attempted with no seal record present
    #[error("not sealed: no seal record exists")]
    NotSealed,

    /// Protocol registry mutation attempted after freeze
    #[error("protocol registry is frozen")]
    ProtocolLocked,

    /// `freeze()` invoked twice with differing definition content
    #[error("registry freeze mismatch: definitions changed since the first freeze")]
    RegistryMismatch,

    /// A collection pass is already writing to the snapshot store
    #[error("collection already in progress")]
    CollectionInProgress,

    /// A snapshot or record was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted or wire record failed validation
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<VigilError>,
    },
}

impl VigilError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for conditions a caller is expected to handle and retry or
    /// report without aborting.
    pub fn is_non_fatal(&self) -> bool {
        matches!(
            self.root(),
            VigilError::TooEarly { .. } | VigilError::CollectionInProgress
        )
    }

    /// Unwrap context layers down to the root cause.
    pub fn root(&self) -> &VigilError {
        match self {
            VigilError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = VigilError::NotFound("snapshot 7".to_string());
        let err = err.context("failed to load sealed prefix");

        assert!(err.to_string().contains("failed to load sealed prefix"));
        assert!(matches!(err.root(), VigilError::NotFound(_)));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(VigilError::AlreadySealed);
        let result = result.context("seal command failed");

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("seal command failed"));
    }

    #[test]
    fn test_non_fatal_classification() {
        assert!(VigilError::TooEarly { remaining_secs: 60 }.is_non_fatal());
        assert!(VigilError::CollectionInProgress.is_non_fatal());
        assert!(!VigilError::AlreadySealed.is_non_fatal());
        assert!(!VigilError::IntegrityViolation {
            expected: "a".to_string(),
            actual: "b".to_string(),
        }
        .is_non_fatal());

        // Context wrapping must not change the classification.
        let wrapped = VigilError::TooEarly { remaining_secs: 1 }.context("unlock");
        assert!(wrapped.is_non_fatal());
    }
}
