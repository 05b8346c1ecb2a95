//! Remote services used by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use optimist_remote::{RemoteError, RemoteOperation, RemoteResponse, RemoteService};

/// Remote que falla todas las operaciones con el mismo error.
pub struct FailingRemote {
    error: RemoteError,
    calls: AtomicUsize,
}

impl FailingRemote {
    pub fn new(error: RemoteError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteService for FailingRemote {
    async fn perform(&self, _op: &RemoteOperation) -> Result<RemoteResponse, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}
