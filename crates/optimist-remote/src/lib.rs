//! # Optimist Remote
//!
//! The outbound contract between the optimist cache engine and the service
//! that actually applies mutations.
//!
//! The engine is transport-agnostic: it only needs something that can
//! perform a named operation and answer with either the canonical entity or
//! a distinguishable error. HTTP clients, RPC stubs or cloud functions all
//! fit behind [`RemoteService`].
//!
//! ## Features
//!
//! - Async trait-based remote service abstraction
//! - Unique idempotency key per operation invocation
//! - Bulk reports that distinguish per-identifier success and failure
//! - [`ScriptedRemote`], an in-memory service for tests and demos
//!
//! ## Example
//!
//! ```ignore
//! use optimist_remote::{RemoteOperation, RemoteService};
//!
//! let op = RemoteOperation::update("clients", "client-7".into(), json!({"name": "B"}));
//! let response = remote.perform(&op).await?;
//! ```

pub mod error;
pub mod scripted;
pub mod service;

// Re-exports
pub use error::RemoteError;
pub use scripted::ScriptedRemote;
pub use service::{
    BulkFailure, BulkReport, OperationName, RemoteOperation, RemoteResponse, RemoteService,
};

// Re-export optimist_core for consumers
pub use optimist_core;
