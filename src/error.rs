//! Error types for the cache and search layer.

use std::fmt;

/// Result type for cache, search and write-workflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache and search layer.
///
/// "Not found" is never an error here: reads report absence through `Option`
/// or [`Lookup::NotFound`](crate::lookup::Lookup::NotFound). The variants below
/// are genuine failures that the service layer has to translate.
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when converting a DTO to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a DTO.
    ///
    /// The read path evicts the offending entry and reloads from the
    /// primary store, so callers only see this from the codec functions.
    DeserializationError(String),

    /// Invalid input, e.g. a page size of zero.
    ValidationError(String),

    /// Cache miss under [`CacheStrategy::Fresh`](crate::strategy::CacheStrategy::Fresh).
    CacheMiss,

    /// Cache backend error (Redis unreachable, pool exhausted, protocol error).
    BackendError(String),

    /// Primary store error.
    RepositoryError(String),

    /// Search engine transport error (connection refused, timeout, TLS).
    ///
    /// Engine-level faults that come back as an HTTP response are not mapped
    /// here; the search client logs them and reports `false` instead.
    SearchError(String),

    /// Begin/commit/rollback on the primary store failed.
    TransactionError(String),

    /// Operation exceeded its configured timeout.
    Timeout(String),

    /// The request was cancelled while a retry was pending.
    Cancelled,

    /// Invalid configuration (bad URL, unreadable certificate, ...).
    ConfigError(String),

    /// Feature not implemented or not enabled for this backend.
    NotImplemented(String),

    /// Cache entry with a bad magic header or corrupted envelope.
    InvalidCacheEntry(String),

    /// Cache entry written by a different schema version.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },
}

impl Error {
    /// True for failures worth retrying against infrastructure. The search
    /// client retries only these.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendError(_) | Error::SearchError(_) | Error::Timeout(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::CacheMiss => write!(f, "Cache miss"),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
            Error::SearchError(msg) => write!(f, "Search engine error: {}", msg),
            Error::TransactionError(msg) => write!(f, "Transaction error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::InvalidCacheEntry(msg) => {
                write!(f, "Invalid cache entry: {}", msg)
            }
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<crate::retry::Cancelled> for Error {
    fn from(_: crate::retry::Cancelled) -> Self {
        Error::Cancelled
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(feature = "opensearch")]
impl From<opensearch::Error> for Error {
    fn from(e: opensearch::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::SearchError(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ValidationError("page_size must be > 0".to_string());
        assert_eq!(err.to_string(), "Validation error: page_size must be > 0");
        assert_eq!(Error::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::SearchError("refused".into()).is_transient());
        assert!(Error::BackendError("down".into()).is_transient());
        assert!(!Error::ValidationError("bad".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn test_cancelled_conversion() {
        let err: Error = crate::retry::Cancelled.into();
        assert!(matches!(err, Error::Cancelled));
    }
}
