//! Error types for reads and mutations.

use optimist_core::{CoreError, EntityId};
use optimist_remote::RemoteError;
use thiserror::Error;

/// Error of the read path.
///
/// Stored on `error` entries, so it is `Clone + PartialEq`. A later read of
/// the same key retries instead of failing permanently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch function failed.
    #[error("failed to fetch: {0}")]
    Failed(String),

    /// The data source could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// No answer arrived in time.
    #[error("fetch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Cached data could not be decoded into the requested type.
    #[error("failed to decode {target}: {message}")]
    Decode { target: String, message: String },
}

impl FetchError {
    /// Creates a generic fetch failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Returns true if retrying might help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

impl From<CoreError> for FetchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Decode {
                target, message, ..
            } => Self::Decode { target, message },
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Error of a mutation invocation.
///
/// Every variant except `Validation` and `CacheInconsistency` is returned
/// only after the optimistic patch has been rolled back.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The payload was rejected before any cache mutation.
    #[error("invalid mutation: {0}")]
    Validation(#[from] CoreError),

    /// The remote service failed; the error is passed through untouched.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The mutation references an entity with no cached entry
    /// (only raised when strict consistency is enabled).
    #[error("cache inconsistency for '{key}': {reason}")]
    CacheInconsistency { key: String, reason: String },

    /// Some identifiers of a bulk operation failed remotely; the whole bulk
    /// was rolled back in the cache and the affected regions invalidated.
    #[error("bulk operation partially failed: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialBulkFailure {
        succeeded: Vec<EntityId>,
        failed: Vec<EntityId>,
    },
}

impl MutationError {
    /// Creates a validation error from a reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(CoreError::invalid_record(reason))
    }

    /// Returns the remote error, if this is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the payload was rejected before touching the cache.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the mutation was rolled back after an optimistic patch.
    pub fn was_rolled_back(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::PartialBulkFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_transparent() {
        let remote = RemoteError::rejected("E_LOCKED", "record locked");
        let err = MutationError::from(remote.clone());

        assert_eq!(err.to_string(), remote.to_string());
        assert_eq!(err.remote(), Some(&remote));
        assert!(err.was_rolled_back());
    }

    #[test]
    fn test_validation_error() {
        let err = MutationError::validation("record has no usable 'id'");
        assert!(err.is_validation());
        assert!(!err.was_rolled_back());
        assert!(err.to_string().contains("no usable 'id'"));
    }

    #[test]
    fn test_fetch_error_from_decode() {
        let cause = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = FetchError::from(CoreError::decode_with_cause("u32", cause));

        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(!err.is_transient());
        assert!(FetchError::Timeout { seconds: 1 }.is_transient());
    }
}
