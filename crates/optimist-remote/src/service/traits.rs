//! Remote service trait definition.

use async_trait::async_trait;

use super::{RemoteOperation, RemoteResponse};
use crate::error::RemoteError;

/// A service able to apply mutations remotely.
///
/// This trait abstracts over transports (HTTP, RPC, cloud functions)
/// so the engine can run the optimistic lifecycle without knowing how the
/// operation reaches the backend.
///
/// # Contract
///
/// - Successful operations return the canonical post-mutation entity
///   (`RemoteResponse::Entity`) or, for bulk operations, a
///   `RemoteResponse::Bulk` report.
/// - Failures are returned as `Err(RemoteError)`, including network and
///   timeout conditions. Implementations must not panic to signal failure.
/// - `op.idempotency_key()` is unique per invocation; a service that
///   receives the same key twice must apply the operation at most once.
///
/// # Example
///
/// ```ignore
/// use optimist_remote::{RemoteService, RemoteOperation, RemoteResponse, RemoteError};
///
/// struct HttpRemote { client: reqwest::Client }
///
/// #[async_trait]
/// impl RemoteService for HttpRemote {
///     async fn perform(&self, op: &RemoteOperation) -> Result<RemoteResponse, RemoteError> {
///         // POST /{entity_type}/{name}
///     }
///
///     fn name(&self) -> &str {
///         "http"
///     }
/// }
/// ```
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Performs the operation remotely.
    ///
    /// # Errors
    ///
    /// - `RemoteError::Rejected` if the backend refused the operation
    /// - `RemoteError::NotFound` if the target entity doesn't exist
    /// - `RemoteError::Unavailable` / `RemoteError::Timeout` for transport failures
    async fn perform(&self, op: &RemoteOperation) -> Result<RemoteResponse, RemoteError>;

    /// Returns the name of this remote service.
    fn name(&self) -> &str;
}
