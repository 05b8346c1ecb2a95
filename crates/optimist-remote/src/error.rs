//! Error types for remote operations.

use optimist_core::EntityId;

/// Errors a remote service can answer with.
///
/// Every variant is a value, never a panic: the coordinator branches on
/// `Ok`/`Err` to pick the commit or rollback path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The service rejected the operation (business rule, permissions, ...).
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The target entity does not exist remotely.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The operation conflicts with the current remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The service could not be reached.
    #[error("service unavailable: {reason}")]
    Unavailable { reason: String },

    /// No answer arrived in time.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A bulk operation applied to some identifiers only.
    #[error("bulk operation partially failed: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialFailure {
        succeeded: Vec<EntityId>,
        failed: Vec<EntityId>,
    },

    /// The service answered with something the engine cannot use.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    /// Creates a new rejection.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new service unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    ///
    /// The engine itself never retries; the flag is for callers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemoteError::rejected("E_DUP", "email already registered");
        assert_eq!(err.to_string(), "rejected (E_DUP): email already registered");

        let err = RemoteError::NotFound(EntityId::new("client-7"));
        assert_eq!(err.to_string(), "entity not found: client-7");

        let err = RemoteError::PartialFailure {
            succeeded: vec![EntityId::new("1")],
            failed: vec![EntityId::new("2"), EntityId::new("3")],
        };
        assert_eq!(
            err.to_string(),
            "bulk operation partially failed: 1 succeeded, 2 failed"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(RemoteError::unavailable("network down").is_transient());
        assert!(RemoteError::Timeout { seconds: 30 }.is_transient());
        assert!(!RemoteError::rejected("E", "no").is_transient());
        assert!(!RemoteError::Conflict("stale version".into()).is_transient());
    }
}
