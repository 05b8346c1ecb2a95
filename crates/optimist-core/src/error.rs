//! Error types for the optimist core.
//!
//! These errors describe malformed input handed to the engine: records
//! without identifiers, patches that are not objects, cached values that
//! cannot be decoded. All errors implement `std::error::Error` via `thiserror`.
//!
//! # Example
//!
//! ```
//! use optimist_core::{CoreError, Result};
//!
//! fn require_name(name: &str) -> Result<&str> {
//!     if name.is_empty() {
//!         return Err(CoreError::invalid_record("name cannot be empty"));
//!     }
//!     Ok(name)
//! }
//!
//! assert!(require_name("").is_err());
//! ```

use thiserror::Error;

/// Main error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record is not usable as an entity (not an object, missing id, ...).
    #[error("Invalid record: {reason}")]
    InvalidRecord {
        /// Why it's invalid
        reason: String,
    },

    /// A partial patch cannot be applied.
    #[error("Invalid patch for field '{field}': {reason}")]
    InvalidPatch {
        /// Field the patch targets
        field: String,
        /// Why it's invalid
        reason: String,
    },

    /// A cached value could not be decoded into the requested type.
    #[error("Failed to decode '{target}': {message}")]
    Decode {
        /// Name of the target type
        target: String,
        /// Description of the decode failure
        message: String,
        /// Underlying error, if any
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CoreError {
    /// Creates an InvalidRecord error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Creates an InvalidPatch error.
    pub fn invalid_patch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Decode error with a cause.
    pub fn decode_with_cause<E>(target: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Decode {
            target: target.into(),
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Returns true if the error concerns caller-supplied input (record or patch).
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. } | Self::InvalidPatch { .. })
    }

    /// Returns true if this is a decode error.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Type alias for Results with CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
