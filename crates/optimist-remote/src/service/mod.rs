//! Remote service abstraction.
//!
//! This module defines the trait the engine calls to apply a mutation
//! remotely, together with the operation and response types.

mod operation;
mod response;
mod traits;

pub use operation::{OperationName, RemoteOperation};
pub use response::{BulkFailure, BulkReport, RemoteResponse};
pub use traits::RemoteService;
